use std::path::PathBuf;

use crate::zip::ZipError;

/// Everything the engine reports on an operation's error stream.
///
/// Only [`Error::Open`] and [`Error::Cancelled`] end an operation; the other
/// variants describe one root path or one entry, and processing continues
/// with the next one.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open '{path}': {source}")]
    Open { path: PathBuf, source: ZipError },

    #[error("walking '{root}' failed for {failed} node(s), first: {first}")]
    Walk {
        root: PathBuf,
        failed: usize,
        #[source]
        first: Box<Error>,
    },

    #[error("zip-slip attack detected: entry '{entry}' resolves to '{resolved}'")]
    PathTraversal { entry: String, resolved: PathBuf },

    #[error("failed to transfer '{path}': {source}")]
    Transfer { path: PathBuf, source: ZipError },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// True for errors that terminate the whole operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Open { .. } | Error::Cancelled)
    }

    pub(crate) fn open(path: impl Into<PathBuf>, source: impl Into<ZipError>) -> Self {
        Error::Open {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn transfer(path: impl Into<PathBuf>, source: impl Into<ZipError>) -> Self {
        Error::Transfer {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
