/// Errors produced by hash and OID operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex character at position {position}: '{character}'")]
    InvalidHex { position: usize, character: char },

    #[error("invalid hex length: expected {expected}, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid object id length: expected {expected} bytes, got {actual}")]
    InvalidIdLength { expected: usize, actual: usize },

    #[error("fan-out table not monotonic at bucket {bucket}: {value} < {previous}")]
    NonMonotonicFanout { bucket: usize, value: u32, previous: u32 },

    #[error("fan-out table truncated: expected 1024 bytes, got {actual}")]
    TruncatedFanout { actual: usize },

    #[error("SHA-1 collision detected")]
    Sha1Collision,
}
