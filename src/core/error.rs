use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    Conflict,
    InvalidValue,
    InvalidState,
    Corrupted,
}

#[derive(Debug, ThisError)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context.into())
    }

    pub fn conflict(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Conflict, context.into())
    }

    pub fn invalid_value(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidValue, context.into())
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Commit-time conflicts are retryable: open a fresh session and redo the work.
    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }

    pub fn is_invalid_value(&self) -> bool {
        self.kind == ErrorKind::InvalidValue
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("JSON error: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
