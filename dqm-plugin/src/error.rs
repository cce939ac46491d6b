use dqm_core::Status;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("plugin directory not found: {0}")]
    NotFound(String),
    #[error("invalid plugin {0}: {1}")]
    InvalidParameter(String, String),
    #[error("failed to load plugin {path}: {message}")]
    Load { path: String, message: String },
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::NotFound(_) => Status::NotFound,
            Error::InvalidParameter(_, _) => Status::InvalidParameter,
            Error::Load { .. } => Status::Failure,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
