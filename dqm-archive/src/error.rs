use dqm_core::Status;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("archive is not open")]
    NotAllowed,
    #[error("directory not found: {0}")]
    NotFound(String),
    #[error("archive I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidParameter(_) => Status::InvalidParameter,
            Error::NotAllowed => Status::NotAllowed,
            Error::NotFound(_) => Status::NotFound,
            Error::Io(_) => Status::Failure,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
