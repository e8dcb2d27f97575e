use thiserror::Error;

/// Errors produced by the hatch protocol and tunnel layers.
#[derive(Debug, Error)]
pub enum HatchError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("relay rejected this client version: {0}")]
    VersionRejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for HatchError {
    fn from(e: serde_json::Error) -> Self {
        HatchError::Codec(e.to_string())
    }
}

pub type HatchResult<T> = Result<T, HatchError>;
