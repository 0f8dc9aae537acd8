//! Electronic Product Code identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tag identifier as upper-case hexadecimal
///
/// The R300/YRM200 reports 12-byte EPCs, so a well-formed value is
/// 24 hex characters. Other lengths can be built for readers configured
/// with a different EPC size; [`Epc::is_standard`] tells them apart.
///
/// # Examples
///
/// ```
/// use swimtag_types::Epc;
///
/// let epc: Epc = "e2 80 11 90 00 00 00 00 00 00 00 01".parse().unwrap();
/// assert_eq!(epc.as_str(), "E28011900000000000000001");
/// assert!(epc.is_standard());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Epc(String);

impl Epc {
    /// EPC size on the reader in scope, in bytes
    pub const STANDARD_BYTES: usize = 12;

    /// EPC size on the reader in scope, in hex characters
    pub const STANDARD_HEX_LEN: usize = Self::STANDARD_BYTES * 2;

    /// Build from raw EPC bytes as carried in a tag sub-record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::EmptyEpc);
        }
        Ok(Self(hex::encode_upper(bytes)))
    }

    /// Strip spaces and upper-case, the form used as a join key
    ///
    /// Accepts the spaced layout printed on registration sheets
    /// (`E2 80 07 EA ...`).
    pub fn normalize(raw: &str) -> String {
        raw.chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes of the identifier
    pub fn to_bytes(&self) -> Vec<u8> {
        // Constructors only admit valid hex
        hex::decode(&self.0).unwrap_or_default()
    }

    /// Length in bytes
    pub fn byte_len(&self) -> usize {
        self.0.len() / 2
    }

    /// Whether this is a 24-character EPC as produced by the reader in scope
    pub fn is_standard(&self) -> bool {
        self.0.len() == Self::STANDARD_HEX_LEN
    }

    /// Space separated byte pairs, as printed on tag labels
    pub fn spaced(&self) -> String {
        self.0
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl FromStr for Epc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = Self::normalize(s);

        if normalized.is_empty() {
            return Err(Error::EmptyEpc);
        }
        if normalized.len() % 2 != 0 {
            return Err(Error::OddLength(normalized.len()));
        }
        if !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::NotHex(s.to_string()));
        }

        Ok(Self(normalized))
    }
}

impl TryFrom<String> for Epc {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Epc> for String {
    fn from(epc: Epc) -> String {
        epc.0
    }
}

impl AsRef<str> for Epc {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Epc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_bytes_upper_hex() {
        let epc = Epc::from_bytes(&[0xE2, 0x80, 0x11, 0x90, 0, 0, 0, 0, 0, 0, 0, 0x01]).unwrap();
        assert_eq!(epc.as_str(), "E28011900000000000000001");
        assert!(epc.is_standard());
        assert_eq!(epc.byte_len(), 12);
    }

    #[test]
    fn test_from_bytes_empty() {
        assert_eq!(Epc::from_bytes(&[]), Err(Error::EmptyEpc));
    }

    #[test]
    fn test_parse_spaced_lowercase() {
        let epc: Epc = " e2 80 07 ea 02 01 01 00 00 01 00 6b ".parse().unwrap();
        assert_eq!(epc.as_str(), "E28007EA020101000001006B");
    }

    #[test]
    fn test_parse_rejects_odd_and_non_hex() {
        assert_eq!("ABC".parse::<Epc>(), Err(Error::OddLength(3)));
        assert_eq!("ZZ".parse::<Epc>(), Err(Error::NotHex("ZZ".into())));
        assert_eq!(" ".parse::<Epc>(), Err(Error::EmptyEpc));
    }

    #[test]
    fn test_short_epc_is_not_standard() {
        let epc: Epc = "ABCD".parse().unwrap();
        assert!(!epc.is_standard());
    }

    #[test]
    fn test_spaced() {
        let epc: Epc = "E28011900000000000000001".parse().unwrap();
        assert_eq!(epc.spaced(), "E2 80 11 90 00 00 00 00 00 00 00 01");
    }

    #[test]
    fn test_serde_as_string() {
        let epc: Epc = "E28011900000000000000001".parse().unwrap();
        let json = serde_json::to_string(&epc).unwrap();
        assert_eq!(json, "\"E28011900000000000000001\"");

        let back: Epc = serde_json::from_str(&json).unwrap();
        assert_eq!(back, epc);
        assert!(serde_json::from_str::<Epc>("\"XYZ\"").is_err());
    }
}
