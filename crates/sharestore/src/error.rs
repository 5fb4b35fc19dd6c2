//! Error types for the share store.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the artifact and counter stores.
///
/// A missing artifact is not an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum ShareError {
    /// The caller supplied something the store will not accept.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Underlying filesystem failure.
    #[error("failed to {op} {}: {source}", path.display())]
    Storage {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Every generated code was already taken.
    #[error("no free share code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// The persisted counter does not hold a decimal integer.
    #[error("counter file {} holds {value:?}, not a decimal integer", path.display())]
    CorruptCounter { path: PathBuf, value: String },

    #[error("store is in read-only mode")]
    ReadOnly,
}

impl ShareError {
    pub fn validation(message: impl Into<String>) -> Self {
        ShareError::Validation(message.into())
    }

    /// True for errors caused by the request rather than the store.
    pub fn is_validation(&self) -> bool {
        matches!(self, ShareError::Validation(_))
    }
}

pub type Result<T, E = ShareError> = std::result::Result<T, E>;

/// Attach the failing operation and path to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn io_context(self, op: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, op: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| ShareError::Storage {
            op,
            path: path.into(),
            source,
        })
    }
}
