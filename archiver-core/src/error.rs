use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The three failure classes the invocation reacts to. Everything else is internal and
/// always fails the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    MissingOriginId,
    WriteExhausted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "Validation"),
            ErrorKind::MissingOriginId => write!(f, "MissingOriginId"),
            ErrorKind::WriteExhausted => write!(f, "WriteExhausted"),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Validation Error - {0}")]
    Validation(String),

    #[error("MissingOriginId Error - {0}")]
    MissingOriginId(String),

    #[error("Serialization Error - {0}")]
    Serialization(String),

    #[error("Store Error - {0}")]
    Store(String),

    #[error("WriteExhausted Error - gave up after {attempts} attempts: {last_error}")]
    WriteExhausted {
        attempts: u16,
        last_error: Box<Error>,
    },

    #[error("Config Error - {0}")]
    Config(String),

    #[error("Metrics Error - {0}")]
    Metrics(String),

    #[error("Event Error - {0}")]
    Event(String),
}

impl Error {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Validation(_) => Some(ErrorKind::Validation),
            Error::MissingOriginId(_) => Some(ErrorKind::MissingOriginId),
            Error::WriteExhausted { .. } => Some(ErrorKind::WriteExhausted),
            _ => None,
        }
    }
}

/// Errors that fail a single record. They never abort the invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("payload of {size} bytes exceeds the maximum of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("record has no origin sequence id")]
    MissingOriginId,
}

impl RecordError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecordError::PayloadTooLarge { .. } => ErrorKind::Validation,
            RecordError::MissingOriginId => ErrorKind::MissingOriginId,
        }
    }
}

impl From<RecordError> for Error {
    fn from(value: RecordError) -> Self {
        match value {
            RecordError::PayloadTooLarge { .. } => Error::Validation(value.to_string()),
            RecordError::MissingOriginId => Error::MissingOriginId(value.to_string()),
        }
    }
}
