//! Type definitions for swimtag

pub mod arrival;
pub mod epc;
pub mod error;
pub mod event;

pub use arrival::{ArrivalRecord, SessionResult};
pub use epc::Epc;
pub use error::{Error, Result};
pub use event::TagDetectionEvent;
