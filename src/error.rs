//! Crate-wide error taxonomy.
//!
//! `NotFound` is deliberately absent: a missing header/hash value is
//! represented as `Option::None` in the typed accessors, never as an error.

use thiserror::Error;

/// Identifies the object a [`EwfError::Corrupt`] failure was detected on,
/// e.g. a chunk index or a section tag, for diagnostics.
pub type ObjectId = String;

#[derive(Debug, Error)]
pub enum EwfError {
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    #[error("corrupt {object}: {message}")]
    Corrupt { object: ObjectId, message: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl EwfError {
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        EwfError::Io { message: message.into(), source }
    }

    pub fn corrupt(object: impl Into<String>, message: impl Into<String>) -> Self {
        EwfError::Corrupt { object: object.into(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, EwfError>;
