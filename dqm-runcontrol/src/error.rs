use dqm_core::Status;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid run parameter: {0}")]
    InvalidParameter(String),
    #[error("password cannot be changed while a run is active")]
    NotAllowed,
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidParameter(_) => Status::InvalidParameter,
            Error::NotAllowed => Status::NotAllowed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
