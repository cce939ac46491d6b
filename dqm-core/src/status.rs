//! Shared status vocabulary returned by fallible core operations.
//!
//! `Status` is a `Copy` enum rather than a `thiserror` error type: most
//! operations that return it treat several variants (`UNCHANGED`, even
//! `NOT_FOUND` for an optimistic lookup) as ordinary control flow, not
//! exceptional failure. Operations that do want `?`-propagation wrap it in
//! [`crate::Error`] instead.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// The call was a no-op because the state already matched the request.
    Unchanged,
    Failure,
    NotFound,
    NotAllowed,
    InvalidParameter,
    InvalidPtr,
    OutOfRange,
    AlreadyPresent,
    NotInitialized,
    Timeout,
}

impl Status {
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success | Status::Unchanged)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "SUCCESS",
            Status::Unchanged => "UNCHANGED",
            Status::Failure => "FAILURE",
            Status::NotFound => "NOT_FOUND",
            Status::NotAllowed => "NOT_ALLOWED",
            Status::InvalidParameter => "INVALID_PARAMETER",
            Status::InvalidPtr => "INVALID_PTR",
            Status::OutOfRange => "OUT_OF_RANGE",
            Status::AlreadyPresent => "ALREADY_PRESENT",
            Status::NotInitialized => "NOT_INITIALIZED",
            Status::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// The library-wide error type for operations that propagate with `?`.
///
/// Every variant carries enough context to be logged usefully and maps back
/// onto a single [`Status`] via [`Error::status`], so callers that only care
/// about the status code can still get one.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not allowed: {0}")]
    NotAllowed(String),
    #[error("already present: {0}")]
    AlreadyPresent(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("not initialized: {0}")]
    NotInitialized(String),
    #[error("operation failed: {0}")]
    Failure(String),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidParameter(_) => Status::InvalidParameter,
            Error::NotFound(_) => Status::NotFound,
            Error::NotAllowed(_) => Status::NotAllowed,
            Error::AlreadyPresent(_) => Status::AlreadyPresent,
            Error::OutOfRange(_) => Status::OutOfRange,
            Error::NotInitialized(_) => Status::NotInitialized,
            Error::Failure(_) => Status::Failure,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
