use thiserror::Error;

#[derive(Error, Debug)]
pub enum TonemapError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid image shape: {0}")]
    Shape(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Resample failed: {0}")]
    Resample(String),

    #[error("No input files found for pattern: {0}")]
    NoInputs(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TonemapError>;
