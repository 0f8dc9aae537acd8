//! Tag event extraction from inventory frames
//!
//! Real-time inventory frames carry back-to-back sub-records:
//!
//! ```text
//! ┌──────────┬────────┬─────────────┬────────┐
//! │ FreqAnt  │   PC   │     EPC     │  RSSI  │
//! │   1B     │   2B   │  epc_len B  │   1B   │
//! └──────────┴────────┴─────────────┴────────┘
//! ```
//!
//! The antenna number is split across two bytes: the low two bits live in
//! FreqAnt and the third bit is the high bit of the RSSI byte.

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use swimtag_types::{Epc, TagDetectionEvent};

use crate::{
    command::Command,
    constants::tag::{
        ANTENNA_MASK, COUNTED_OVERHEAD, DEFAULT_EPC_LEN, DEFAULT_RSSI_OFFSET, FREQUENCY_MASK,
        FREQ_ANT_LEN, PC_LEN, RSSI_ANTENNA_BIT, RSSI_LEN, RSSI_MASK, TAG_COUNT_LEN,
    },
    frame::Frame,
};

/// Sub-record layout used for buffered retrieval frames (0x90, 0x91)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferedLayout {
    /// Same sub-records as real-time inventory
    #[default]
    Inventory,

    /// `TagCount(2) DataLen(1) PC(2) EPC CRC(2) RSSI(1) FreqAnt(1) ReadCount(1)`
    Counted,
}

/// Extraction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// EPC size in bytes
    pub epc_len: usize,

    /// Subtracted from the masked RSSI byte to get dBm
    pub rssi_offset: i16,

    /// Added to the merged antenna bits (1 gives the labels printed on the reader)
    pub antenna_base: u8,

    /// Layout of buffered retrieval frames
    pub buffered_layout: BufferedLayout,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            epc_len: DEFAULT_EPC_LEN,
            rssi_offset: DEFAULT_RSSI_OFFSET,
            antenna_base: 0,
            buffered_layout: BufferedLayout::default(),
        }
    }
}

/// Decode the antenna index and the dBm value from their two raw bytes
///
/// ```text
/// antenna = base + ((freq_ant & 0x03) | (rssi_raw >> 7) << 2)
/// rssi    = (rssi_raw & 0x7F) - rssi_offset
/// ```
///
/// # Examples
///
/// ```
/// use swimtag_core::extract::{decode_antenna_rssi, ExtractorConfig};
///
/// let config = ExtractorConfig::default();
/// assert_eq!(decode_antenna_rssi(0x01, 0x48, &config), (1, -57));
/// assert_eq!(decode_antenna_rssi(0x01, 0xC8, &config), (5, -57));
/// ```
pub fn decode_antenna_rssi(freq_ant: u8, rssi_raw: u8, config: &ExtractorConfig) -> (u8, i16) {
    let high = (rssi_raw & RSSI_ANTENNA_BIT) >> 7;
    let antenna = config
        .antenna_base
        .wrapping_add((freq_ant & ANTENNA_MASK) | (high << 2));
    let rssi = i16::from(rssi_raw & RSSI_MASK) - config.rssi_offset;

    (antenna, rssi)
}

/// Frequency channel index held in the upper six bits of FreqAnt
pub fn frequency_index(freq_ant: u8) -> u8 {
    (freq_ant & FREQUENCY_MASK) >> 2
}

/// Result of running one frame through the extractor
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    /// Inventory frame; may hold no sightings (e.g. end-of-round summaries)
    Tags {
        reader_id: u8,
        command: Command,
        events: Vec<TagDetectionEvent>,
    },

    /// Frame without tag semantics, passed through untouched
    Other(Frame),
}

impl FrameEvent {
    /// Tag sightings, empty for non-inventory frames
    pub fn events(&self) -> &[TagDetectionEvent] {
        match self {
            Self::Tags { events, .. } => events,
            Self::Other(_) => &[],
        }
    }

    pub fn into_events(self) -> Vec<TagDetectionEvent> {
        match self {
            Self::Tags { events, .. } => events,
            Self::Other(_) => Vec::new(),
        }
    }
}

/// Turns inventory frames into tag detection events
#[derive(Debug, Clone, Default)]
pub struct TagExtractor {
    config: ExtractorConfig,
}

impl TagExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Size of one real-time sub-record
    pub fn record_size(&self) -> usize {
        FREQ_ANT_LEN + PC_LEN + self.config.epc_len + RSSI_LEN
    }

    /// Extract events stamped with the current host time
    pub fn extract(&self, frame: &Frame) -> FrameEvent {
        self.extract_at(frame, Local::now())
    }

    /// Extract events stamped with `captured_at`
    pub fn extract_at(&self, frame: &Frame, captured_at: DateTime<Local>) -> FrameEvent {
        if !frame.is_inventory() {
            trace!("Passing through {}", frame);
            return FrameEvent::Other(frame.clone());
        }

        let events = if frame.command.is_buffered()
            && self.config.buffered_layout == BufferedLayout::Counted
        {
            self.counted_record(frame, captured_at).into_iter().collect()
        } else {
            self.inventory_records(frame, captured_at)
        };

        FrameEvent::Tags {
            reader_id: frame.reader_id,
            command: frame.command,
            events,
        }
    }

    fn inventory_records(&self, frame: &Frame, captured_at: DateTime<Local>) -> Vec<TagDetectionEvent> {
        let size = self.record_size();
        let mut records = frame.data.chunks_exact(size);

        let events: Vec<TagDetectionEvent> = records
            .by_ref()
            .filter_map(|record| {
                let epc_start = FREQ_ANT_LEN + PC_LEN;
                self.build_event(
                    frame.reader_id,
                    record[0],
                    &record[epc_start..epc_start + self.config.epc_len],
                    record[size - 1],
                    captured_at,
                )
            })
            .collect();

        let remainder = records.remainder().len();
        if remainder > 0 {
            debug!(
                command = %frame.command,
                remainder,
                record_size = size,
                "Truncated tag record, stopping extraction for this frame"
            );
        }

        events
    }

    fn counted_record(&self, frame: &Frame, captured_at: DateTime<Local>) -> Option<TagDetectionEvent> {
        let data = &frame.data[..];
        if data.len() < TAG_COUNT_LEN + COUNTED_OVERHEAD {
            debug!(len = data.len(), "Buffered record too short");
            return None;
        }

        let remaining = BigEndian::read_u16(&data[..TAG_COUNT_LEN]);
        let body = &data[TAG_COUNT_LEN..];

        // DataLen covers PC + EPC + CRC
        let data_len = body[0] as usize;
        let Some(epc_len) = data_len.checked_sub(PC_LEN + 2) else {
            debug!(data_len, "Buffered record length too small");
            return None;
        };
        if epc_len != self.config.epc_len {
            debug!(epc_len, expected = self.config.epc_len, "Unexpected EPC length, dropping record");
            return None;
        }
        if body.len() < COUNTED_OVERHEAD + epc_len {
            debug!(len = body.len(), "Truncated buffered record");
            return None;
        }

        let epc_start = 1 + PC_LEN;
        let epc = &body[epc_start..epc_start + epc_len];
        let after_crc = epc_start + epc_len + 2;
        let rssi_raw = body[after_crc];
        let freq_ant = body[after_crc + 1];
        let read_count = body[after_crc + 2];

        trace!(remaining, read_count, "Buffered tag record");

        self.build_event(frame.reader_id, freq_ant, epc, rssi_raw, captured_at)
    }

    fn build_event(
        &self,
        reader_id: u8,
        freq_ant: u8,
        epc: &[u8],
        rssi_raw: u8,
        captured_at: DateTime<Local>,
    ) -> Option<TagDetectionEvent> {
        let epc = match Epc::from_bytes(epc) {
            Ok(epc) => epc,
            Err(e) => {
                debug!("Dropping tag record: {}", e);
                return None;
            }
        };

        let (antenna, rssi) = decode_antenna_rssi(freq_ant, rssi_raw, &self.config);

        Some(TagDetectionEvent {
            epc,
            antenna,
            rssi,
            frequency: frequency_index(freq_ant),
            reader_id,
            captured_at,
        })
    }
}
