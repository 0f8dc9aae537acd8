//! Error types for swimtag-core

/// Result type alias for swimtag operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame is too short to be valid
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort {
        expected: usize,
        actual: usize,
    },

    /// First byte is not the frame marker
    #[error("Invalid frame marker: 0x{0:02X}")]
    InvalidMarker(u8),

    /// LENGTH does not describe the bytes handed in
    #[error("Invalid frame length: declared {declared}, frame holds {actual} bytes after the length byte")]
    InvalidLength {
        declared: u8,
        actual: usize,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch {
        expected: u8,
        received: u8,
    },

    /// Data does not fit in one frame
    #[error("Data too large: {size} bytes (max: {max} bytes)")]
    DataTooLarge {
        size: usize,
        max: usize,
    },

    /// Competition session already finalized
    #[error("Competition session is closed")]
    SessionClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if the byte stream can recover by resynchronizing
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FrameTooShort { .. }
                | Self::InvalidMarker(_)
                | Self::InvalidLength { .. }
                | Self::ChecksumMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_errors_are_recoverable() {
        assert!(Error::InvalidMarker(0x00).is_recoverable());
        assert!(Error::ChecksumMismatch { expected: 1, received: 2 }.is_recoverable());
        assert!(!Error::SessionClosed.is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::ChecksumMismatch { expected: 0x13, received: 0xFF };
        assert_eq!(err.to_string(), "Checksum mismatch: expected 0x13, received 0xFF");
    }
}
