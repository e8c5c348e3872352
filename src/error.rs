use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Coarse classification used by the transport to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidArgument,
    BackendUnavailable,
}

impl SplitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SplitError::NotFound(_) => ErrorKind::NotFound,
            SplitError::Conflict(_) => ErrorKind::Conflict,
            SplitError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SplitError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
        }
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;
