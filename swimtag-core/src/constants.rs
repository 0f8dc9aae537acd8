//! Protocol constants

/// Synchronization byte opening every frame
pub const FRAME_MARKER: u8 = 0xA0;

/// Marker + length byte
pub const HEADER_SIZE: usize = 2;

/// Smallest legal LENGTH value: reader id + command + checksum
pub const MIN_LENGTH: u8 = 3;

/// Smallest complete frame (no data)
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + MIN_LENGTH as usize;

/// Largest complete frame (LENGTH = 0xFF)
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + u8::MAX as usize;

/// Largest DATA section a frame can carry
pub const MAX_DATA_SIZE: usize = u8::MAX as usize - MIN_LENGTH as usize;

/// Default connection timeout (milliseconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Default socket read timeout (milliseconds)
///
/// Short enough that a stop request is noticed promptly.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500;

/// Tag sub-record layout
pub mod tag {
    /// Frequency/antenna byte
    pub const FREQ_ANT_LEN: usize = 1;

    /// Protocol control word
    pub const PC_LEN: usize = 2;

    /// Trailing RSSI byte
    pub const RSSI_LEN: usize = 1;

    /// EPC length on the R300/YRM200 (bytes)
    pub const DEFAULT_EPC_LEN: usize = 12;

    /// Raw RSSI to dBm offset from the reader's RSSI table
    pub const DEFAULT_RSSI_OFFSET: i16 = 129;

    /// Low antenna bits of the freq/antenna byte
    pub const ANTENNA_MASK: u8 = 0x03;

    /// Frequency channel bits of the freq/antenna byte
    pub const FREQUENCY_MASK: u8 = 0xFC;

    /// RSSI bit reused as the third antenna bit
    pub const RSSI_ANTENNA_BIT: u8 = 0x80;

    /// RSSI magnitude bits
    pub const RSSI_MASK: u8 = 0x7F;

    /// Bytes of the counted (buffer) layout around the EPC:
    /// data len (1) + PC (2) + CRC (2) + RSSI (1) + freq/antenna (1) + read count (1)
    pub const COUNTED_OVERHEAD: usize = 8;

    /// Tag count prefix of buffer responses
    pub const TAG_COUNT_LEN: usize = 2;
}
