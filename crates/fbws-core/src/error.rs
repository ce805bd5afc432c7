use thiserror::Error;

/// Errors produced by the fbws protocol layer.
#[derive(Debug, Error)]
pub enum FbwsError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A local API call was made with arguments of the wrong shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("not running")]
    NotRunning,

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("busy: {0}")]
    Busy(String),

    #[error("event not supported: {0}")]
    UnsupportedEvent(String),

    #[error("operation failed: {0}")]
    Operation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for FbwsError {
    fn from(e: serde_json::Error) -> Self {
        FbwsError::Codec(e.to_string())
    }
}

pub type FbwsResult<T> = Result<T, FbwsError>;
