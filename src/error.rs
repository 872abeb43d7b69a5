//! Error types for kmerstore.

use std::io;
use thiserror::Error;

/// The result type used throughout kmerstore.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for kmerstore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying byte stream failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Persisted data is malformed: unknown version, short read, bad layout.
    #[error("Format error: {0}")]
    Format(String),

    /// A batch or buffer would exceed its configured bounds.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The object is in a state that does not allow the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A checksum mismatch was detected.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The expected checksum value.
        expected: u32,
        /// The actual checksum value.
        actual: u32,
    },

    /// The database already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Creates a new format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Creates a new capacity error.
    pub fn capacity(msg: impl Into<String>) -> Self {
        Error::Capacity(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Converts a failed `read_exact` into a format error when the stream
    /// simply ran out, leaving every other I/O failure untouched.
    pub(crate) fn from_read(err: io::Error, what: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::Format(format!("truncated input while reading {}", what))
        } else {
            Error::Io(err)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Format(err.to_string())
    }
}
