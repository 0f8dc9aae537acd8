//! # swimtag
//!
//! Finish-line timing for open-water swimming with R300/YRM200 UHF RFID
//! readers.
//!
//! ## Features
//!
//! - Streaming decoder for the reader's `0xA0` framed TCP protocol
//! - Tag sightings with antenna, RSSI and capture time
//! - Arrival register: first sighting per tag wins, positions, race time
//! - Results CSV and JSON backup, roster join, EPC provisioning
//!
//! ## Quick Start
//!
//! ```no_run
//! use swimtag::{ArrivalRegister, Reader, ReaderConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> swimtag::Result<()> {
//!     let config = ReaderConfig::default().apply_env()?;
//!     let mut reader = Reader::new(&config);
//!     reader.connect().await?;
//!
//!     let register = ArrivalRegister::new();
//!     register.establish_point_zero()?;
//!
//!     let cancel = CancellationToken::new();
//!     reader
//!         .run(&cancel, |event| {
//!             for tag in event.events() {
//!                 if let Ok(Some(record)) = register.register_arrival(tag) {
//!                     println!("{}", record);
//!                 }
//!             }
//!         })
//!         .await?;
//!
//!     swimtag::report::save_results(&register.finalize(), "resultados_nadadores")?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod provision;
pub mod reader;
pub mod report;
pub mod roster;
pub mod table;

// Re-exports
pub use config::ReaderConfig;
pub use error::{Error, Result};
pub use reader::{Reader, StopReason};

// Re-export core types
pub use swimtag_core::{ArrivalRegister, ChecksumMode, Command, Frame, FrameEvent, RegisterState};
pub use swimtag_transport::{ReplayStep, ReplayTransport};
pub use swimtag_types::{ArrivalRecord, Epc, SessionResult, TagDetectionEvent};
