//! Transport-level errors: they surface as the caller's status, never
//! silently suppressed, but never globally fatal either.

use dqm_core::Status;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("channel not found: {0}")]
    NotFound(String),
    #[error("channel already exists: {0}")]
    AlreadyPresent(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("transport is not connected")]
    NotInitialized,
    #[error("underlying transport failure: {0}")]
    Failure(String),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::NotFound(_) => Status::NotFound,
            Error::AlreadyPresent(_) => Status::AlreadyPresent,
            Error::InvalidParameter(_) => Status::InvalidParameter,
            Error::Timeout(_) => Status::Timeout,
            Error::NotInitialized => Status::NotInitialized,
            Error::Failure(_) => Status::Failure,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
