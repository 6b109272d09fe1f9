use std::io;

/// Errors raised while reading or writing the ZIP container itself.
#[derive(Debug, thiserror::Error)]
pub enum ZipError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("not a valid ZIP file")]
    NotZip,

    #[error("invalid {0}")]
    Malformed(&'static str),

    #[error("unsupported compression method: {0}")]
    UnsupportedMethod(u16),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("CRC-32 mismatch for '{name}': expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error("size mismatch for '{name}': expected {expected} bytes, got {actual}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("archive output failed earlier, no further entries can be written")]
    Poisoned,

    #[error("deflate failed: {0}")]
    Compress(#[from] flate2::CompressError),

    #[error("inflate failed: {0}")]
    Decompress(#[from] flate2::DecompressError),
}

pub type Result<T> = std::result::Result<T, ZipError>;
