//! Reader protocol frame structure and encoding/decoding

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum::{self, ChecksumMode},
    command::Command,
    constants::{FRAME_MARKER, HEADER_SIZE, MAX_DATA_SIZE, MIN_FRAME_SIZE, MIN_LENGTH},
    error::{Error, Result},
};

/// Reader protocol frame
///
/// # Frame Structure
///
/// ```text
/// ┌────────┬────────┬───────────┬─────────┬──────────────┬──────────┐
/// │ Marker │ Length │ Reader ID │ Command │     Data     │ Checksum │
/// │  0xA0  │   1B   │    1B     │   1B    │ Length-3 B   │    1B    │
/// └────────┴────────┴───────────┴─────────┴──────────────┴──────────┘
/// ```
///
/// `Length` counts every byte after itself. The checksum algorithm is
/// chosen by [`ChecksumMode`].
///
/// # Examples
///
/// ```
/// use swimtag_core::{ChecksumMode, Command, Frame};
///
/// let frame = Frame::with_data(0x01, Command::RealTimeInventory, vec![1, 2, 3]);
/// let encoded = frame.encode(ChecksumMode::Xor).unwrap();
///
/// let decoded = Frame::decode(&encoded, ChecksumMode::Xor).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Physical reader unit
    pub reader_id: u8,

    /// Opcode
    pub command: Command,

    /// Command-specific payload
    pub data: Bytes,
}

impl Frame {
    /// Create a frame with empty data
    pub fn new(reader_id: u8, command: Command) -> Self {
        Self {
            reader_id,
            command,
            data: Bytes::new(),
        }
    }

    /// Create a frame with data
    pub fn with_data(reader_id: u8, command: Command, data: impl Into<Bytes>) -> Self {
        Self {
            reader_id,
            command,
            data: data.into(),
        }
    }

    /// LENGTH field value for this frame
    ///
    /// Saturates for oversized data; [`Frame::encode`] rejects those frames.
    pub fn length(&self) -> u8 {
        u8::try_from(self.data.len() + MIN_LENGTH as usize).unwrap_or(u8::MAX)
    }

    /// Total encoded size
    pub fn size(&self) -> usize {
        MIN_FRAME_SIZE + self.data.len()
    }

    /// Check if the opcode carries tag sightings
    pub fn is_inventory(&self) -> bool {
        self.command.is_inventory()
    }

    /// Calculate the checksum byte for this frame
    pub fn checksum(&self, mode: ChecksumMode) -> u8 {
        checksum::calculate(mode, &self.body())
    }

    /// Encode frame to bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataTooLarge`] when the data does not fit in a
    /// one-byte LENGTH.
    pub fn encode(&self, mode: ChecksumMode) -> Result<BytesMut> {
        if self.data.len() > MAX_DATA_SIZE {
            return Err(Error::DataTooLarge {
                size: self.data.len(),
                max: MAX_DATA_SIZE,
            });
        }

        let mut buf = self.body();
        let checksum = checksum::calculate(mode, &buf);
        buf.put_u8(checksum);

        Ok(buf)
    }

    /// Decode one complete frame
    ///
    /// `buf` must hold exactly one frame, marker through checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is too short (< 5 bytes)
    /// - First byte is not the marker
    /// - LENGTH disagrees with the buffer size
    /// - Checksum verification fails
    pub fn decode(buf: &[u8], mode: ChecksumMode) -> Result<Self> {
        if buf.len() < MIN_FRAME_SIZE {
            return Err(Error::FrameTooShort {
                expected: MIN_FRAME_SIZE,
                actual: buf.len(),
            });
        }

        if buf[0] != FRAME_MARKER {
            return Err(Error::InvalidMarker(buf[0]));
        }

        let declared = buf[1];
        let actual = buf.len() - HEADER_SIZE;
        if declared < MIN_LENGTH || declared as usize != actual {
            return Err(Error::InvalidLength { declared, actual });
        }

        let (body, trailer) = buf.split_at(buf.len() - 1);
        let received = trailer[0];
        let expected = checksum::calculate(mode, body);
        if expected != received {
            return Err(Error::ChecksumMismatch { expected, received });
        }

        Ok(Self {
            reader_id: body[2],
            command: Command::from(body[3]),
            data: Bytes::copy_from_slice(&body[4..]),
        })
    }

    /// Marker through last data byte
    fn body(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_u8(FRAME_MARKER);
        buf.put_u8(self.length());
        buf.put_u8(self.reader_id);
        buf.put_u8(self.command.code());
        buf.put_slice(&self.data);
        buf
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("reader_id", &format!("0x{:02X}", self.reader_id))
            .field("command", &self.command)
            .field("length", &self.length())
            .field("data", &format!("{:02X?}", &self.data[..self.data.len().min(32)]))
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[{}](reader={}, len={})",
            self.command,
            self.reader_id,
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const INVENTORY_FRAME: [u8; 21] = [
        0xA0, 0x13, 0x01, 0x89, 0x01, 0x30, 0x00, 0xE2, 0x80, 0x11, 0x90, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x01, 0x48, 0x13,
    ];

    #[test]
    fn test_frame_new() {
        let frame = Frame::new(0x01, Command::RealTimeInventory);
        assert_eq!(frame.length(), 3);
        assert_eq!(frame.size(), 5);
        assert!(frame.data.is_empty());
    }

    #[test]
    fn test_decode_known_inventory_frame() {
        let frame = Frame::decode(&INVENTORY_FRAME, ChecksumMode::Xor).unwrap();

        assert_eq!(frame.reader_id, 0x01);
        assert_eq!(frame.command, Command::RealTimeInventory);
        assert_eq!(frame.data.len(), 16);
        assert_eq!(frame.length(), 0x13);
    }

    #[test]
    fn test_encode_matches_wire_bytes() {
        let frame = Frame::with_data(0x01, Command::RealTimeInventory, INVENTORY_FRAME[4..20].to_vec());
        let encoded = frame.encode(ChecksumMode::Xor).unwrap();
        assert_eq!(encoded.as_ref(), &INVENTORY_FRAME[..]);
    }

    #[test]
    fn test_encode_decode_all_modes() {
        let sent = Frame::with_data(0x05, Command::Other(0x72), vec![0xAB; 40]);

        for mode in [ChecksumMode::Xor, ChecksumMode::Sum, ChecksumMode::TwosComplement] {
            let encoded = sent.encode(mode).unwrap();
            let decoded = Frame::decode(&encoded, mode).unwrap();
            assert_eq!(sent, decoded);
        }
    }

    #[test]
    fn test_sum_checksum_on_known_frame() {
        let mut wire = INVENTORY_FRAME;
        wire[20] = 0xBA;
        assert!(Frame::decode(&wire, ChecksumMode::Sum).is_ok());
        assert!(Frame::decode(&wire, ChecksumMode::Xor).is_err());
    }

    #[test]
    fn test_frame_checksum_verification() {
        let mut wire = INVENTORY_FRAME;
        wire[10] ^= 0x01;

        let result = Frame::decode(&wire, ChecksumMode::Xor);
        if let Err(Error::ChecksumMismatch { expected, received }) = result {
            assert_ne!(expected, received);
            assert_eq!(received, 0x13);
        } else {
            panic!("Expected ChecksumMismatch error");
        }
    }

    #[test]
    fn test_frame_too_short() {
        let result = Frame::decode(&[0xA0, 0x03, 0x01], ChecksumMode::Xor);
        assert!(matches!(result, Err(Error::FrameTooShort { .. })));
    }

    #[test]
    fn test_invalid_marker() {
        let mut wire = INVENTORY_FRAME;
        wire[0] = 0xA1;
        assert!(matches!(
            Frame::decode(&wire, ChecksumMode::Xor),
            Err(Error::InvalidMarker(0xA1))
        ));
    }

    #[test]
    fn test_length_mismatch() {
        let result = Frame::decode(&INVENTORY_FRAME[..20], ChecksumMode::Xor);
        assert!(matches!(
            result,
            Err(Error::InvalidLength { declared: 0x13, actual: 18 })
        ));
    }

    #[test]
    fn test_data_too_large() {
        let frame = Frame::with_data(0x01, Command::RealTimeInventory, vec![0; MAX_DATA_SIZE + 1]);
        assert!(matches!(
            frame.encode(ChecksumMode::Xor),
            Err(Error::DataTooLarge { .. })
        ));

        let largest = Frame::with_data(0x01, Command::RealTimeInventory, vec![0; MAX_DATA_SIZE]);
        let encoded = largest.encode(ChecksumMode::Xor).unwrap();
        assert_eq!(encoded[1], 0xFF);
    }

    #[test]
    fn test_unknown_command_decodes() {
        let frame = Frame::with_data(0x01, Command::Other(0x74), vec![0x10]);
        let encoded = frame.encode(ChecksumMode::Xor).unwrap();
        let decoded = Frame::decode(&encoded, ChecksumMode::Xor).unwrap();
        assert_eq!(decoded.command, Command::Other(0x74));
        assert!(!decoded.is_inventory());
    }
}
