//! High-level error types

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] swimtag_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] swimtag_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] swimtag_types::Error),

    #[error("Reader not connected")]
    NotConnected,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Roster error: {0}")]
    Roster(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Provisioning error: {0}")]
    Provision(String),
}

impl Error {
    /// Map `NotFound` to [`Error::FileNotFound`] with the offending path
    pub(crate) fn open(path: impl Into<PathBuf>, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::FileNotFound(path.into())
        } else {
            Self::Io(err)
        }
    }
}
