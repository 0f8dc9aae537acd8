//! # swimtag-core
//!
//! Protocol decoding and race timing for R300/YRM200 UHF RFID readers.
//!
//! This crate provides:
//! - Frame structure and encoding/decoding
//! - Checksum calculation
//! - Command definitions
//! - Streaming decoder with resynchronization
//! - Tag event extraction
//! - The arrival register (deduplication, positions, race time)

pub mod checksum;
pub mod command;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod extract;
pub mod frame;
pub mod register;

pub use checksum::ChecksumMode;
pub use command::Command;
pub use decoder::{DecoderStats, FrameDecoder};
pub use error::{Error, Result};
pub use extract::{BufferedLayout, ExtractorConfig, FrameEvent, TagExtractor};
pub use frame::Frame;
pub use register::{ArrivalRegister, RegisterState};

/// Default reader TCP port
pub const DEFAULT_PORT: u16 = 4001;
