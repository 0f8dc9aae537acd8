//! Tag detection events

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::epc::Epc;

/// One sighting of one physical tag
///
/// Built by the extractor from a single tag sub-record. The reader does not
/// timestamp its frames, so `captured_at` is the host clock at extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDetectionEvent {
    /// Tag identifier
    pub epc: Epc,

    /// Antenna port index (bit-merged from the freq/antenna and RSSI bytes)
    pub antenna: u8,

    /// Signal strength in dBm
    pub rssi: i16,

    /// Frequency channel index reported with the sighting
    pub frequency: u8,

    /// Reader unit that produced the frame
    pub reader_id: u8,

    /// Host wall-clock instant the frame was parsed
    pub captured_at: DateTime<Local>,
}

impl TagDetectionEvent {
    pub fn new(epc: Epc, antenna: u8, rssi: i16, captured_at: DateTime<Local>) -> Self {
        Self {
            epc,
            antenna,
            rssi,
            frequency: 0,
            reader_id: 0,
            captured_at,
        }
    }
}

impl fmt::Display for TagDetectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tag(EPC={}, RSSI={}dBm, Ant={}, Time={})",
            self.epc,
            self.rssi,
            self.antenna,
            self.captured_at.format("%H:%M:%S%.3f")
        )
    }
}
