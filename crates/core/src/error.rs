use thiserror::Error;

#[derive(Debug, Error)]
pub enum StitchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed trace blob: {0}")]
    MalformedBlob(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StitchError>;
