pub type Result<T> = std::result::Result<T, Error>;

/// Reasons an EPC is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("EPC must not be empty")]
    EmptyEpc,

    #[error("EPC must have an even number of hex digits, got {0}")]
    OddLength(usize),

    #[error("EPC is not hexadecimal: {0}")]
    NotHex(String),
}
