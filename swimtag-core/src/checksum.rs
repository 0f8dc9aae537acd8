//! Frame checksum algorithms
//!
//! The byte range the reader covers depends on firmware revision, so the
//! algorithm is selected with [`ChecksumMode`]:
//!
//! ```text
//! Xor            : XOR of READER_ID .. last DATA byte
//! Sum            : (MARKER + LENGTH + READER_ID + ... + last DATA byte) mod 256
//! TwosComplement : two's complement of Sum
//! ```
//!
//! All functions take the frame bytes from the marker up to, but not
//! including, the checksum byte.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::constants::HEADER_SIZE;

/// Checksum algorithm and covered byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChecksumMode {
    /// XOR of reader id through the last data byte
    #[default]
    Xor,

    /// Wrapping byte sum of marker through the last data byte
    Sum,

    /// Two's complement of the wrapping byte sum (vendor manual)
    TwosComplement,
}

impl ChecksumMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Xor => "xor",
            Self::Sum => "sum",
            Self::TwosComplement => "twos-complement",
        }
    }
}

/// Calculate the checksum byte for `frame` (marker through last data byte)
///
/// # Examples
///
/// ```
/// use swimtag_core::checksum::{self, ChecksumMode};
///
/// let body = [0xA0, 0x03, 0x01, 0x89];
/// assert_eq!(checksum::calculate(ChecksumMode::Xor, &body), 0x01 ^ 0x89);
/// ```
pub fn calculate(mode: ChecksumMode, frame: &[u8]) -> u8 {
    let checksum = match mode {
        ChecksumMode::Xor => frame
            .get(HEADER_SIZE..)
            .unwrap_or_default()
            .iter()
            .fold(0u8, |acc, b| acc ^ b),
        ChecksumMode::Sum => byte_sum(frame),
        ChecksumMode::TwosComplement => (!byte_sum(frame)).wrapping_add(1),
    };

    trace!(
        mode = mode.name(),
        len = frame.len(),
        checksum = format!("0x{:02X}", checksum),
        "Calculated checksum"
    );

    checksum
}

/// Verify a received checksum byte
pub fn verify(mode: ChecksumMode, frame: &[u8], expected: u8) -> bool {
    calculate(mode, frame) == expected
}

fn byte_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: [u8; 6] = [0xA0, 0x05, 0x01, 0x89, 0x10, 0x20];

    #[test]
    fn test_xor_excludes_marker_and_length() {
        assert_eq!(calculate(ChecksumMode::Xor, &BODY), 0x01 ^ 0x89 ^ 0x10 ^ 0x20);
    }

    #[test]
    fn test_sum_covers_whole_body() {
        let expected = (0xA0u32 + 0x05 + 0x01 + 0x89 + 0x10 + 0x20) as u8;
        assert_eq!(calculate(ChecksumMode::Sum, &BODY), expected);
    }

    #[test]
    fn test_twos_complement_adds_to_zero() {
        let cs = calculate(ChecksumMode::TwosComplement, &BODY);
        assert_eq!(byte_sum(&BODY).wrapping_add(cs), 0);
    }

    #[test]
    fn test_verify() {
        for mode in [ChecksumMode::Xor, ChecksumMode::Sum, ChecksumMode::TwosComplement] {
            let cs = calculate(mode, &BODY);
            assert!(verify(mode, &BODY, cs));
            assert!(!verify(mode, &BODY, cs.wrapping_add(1)));
        }
    }

    #[test]
    fn test_short_input_does_not_panic() {
        assert_eq!(calculate(ChecksumMode::Xor, &[0xA0]), 0);
        assert_eq!(calculate(ChecksumMode::Sum, &[]), 0);
    }

    #[test]
    fn test_mode_serde_names() {
        let mode: ChecksumMode = serde_json::from_str("\"twos-complement\"").unwrap();
        assert_eq!(mode, ChecksumMode::TwosComplement);
        assert_eq!(serde_json::to_string(&ChecksumMode::Xor).unwrap(), "\"xor\"");
    }
}
