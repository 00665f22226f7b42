use thiserror::Error;

#[derive(Error, Debug)]
pub enum VentError {
    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse waveform: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Model collaborator failed: {0}")]
    ModelError(String),

    #[error("Result store failed: {0}")]
    StoreError(String),

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VentError>;

/// Failure of a single model invocation. Never escapes the breath it belongs to.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("model invocation failed: {0}")]
    Model(String),

    #[error("model output has {actual} values, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("invalid model input: {0}")]
    InvalidInput(String),

    #[error("model did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("model process IO error: {0}")]
    Io(#[from] std::io::Error),
}
