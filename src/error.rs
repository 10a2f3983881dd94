use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for cascade sort operations.
pub type Result<T> = std::result::Result<T, CascadeError>;

/// Error type for cascade sort operations.
#[derive(Error, Debug)]
pub enum CascadeError {
    /// Too few tapes to run a cascade merge.
    #[error("Invalid tape count {tapes}: at least {} tapes are required", crate::MIN_TAPES)]
    Configuration {
        /// The rejected tape count
        tapes: usize,
    },

    /// The file to sort could not be opened for reading and writing.
    #[error("Failed to open '{}' for reading and writing: {source}", .path.display())]
    Open {
        /// Path of the file to sort
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// A tape would be created over the file being sorted.
    #[error("Tape '{}' would overwrite the file being sorted", .path.display())]
    TapeCollision {
        /// Path shared by the tape and the source
        path: PathBuf,
    },

    /// A read or write on a tape failed part way through the sort.
    #[error("I/O error on tape '{}': {source}", .path.display())]
    Io {
        /// Path of the tape
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// A token in the input is not an integer.
    #[error("Malformed token '{token}' in '{}'", .path.display())]
    MalformedToken {
        /// Path of the tape holding the token
        path: PathBuf,
        /// The token as read, lossily decoded
        token: String,
    },

    /// The run bookkeeping promised data that was not there.
    #[error("Run bookkeeping violated: {0}")]
    InvariantViolation(String),
}

impl CascadeError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        CascadeError::Io { path: path.to_path_buf(), source }
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        CascadeError::InvariantViolation(msg.into())
    }
}
