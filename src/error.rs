use thiserror::Error;

#[derive(Error, Debug)]
pub enum OnvifError {
    #[error("Connect error: {0}")]
    ConnectError(String),

    #[error("Device fault {code}: {reason}")]
    ProtocolFault { code: String, reason: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, OnvifError>;
