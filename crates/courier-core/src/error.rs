use thiserror::Error;

/// Errors produced by the courier protocol and delivery layers.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("auth service unavailable: {0}")]
    AuthUnavailable(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("notification dispatch failed: {0}")]
    Notify(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("hub closed")]
    HubClosed,

    #[error("config error: {0}")]
    Config(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CourierError {
    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        CourierError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Text suitable for an `error` frame sent back to a client.
    ///
    /// Only usage errors are described verbatim; internal failures are
    /// reduced to a generic message.
    pub fn client_message(&self) -> String {
        match self {
            CourierError::Validation { .. } => self.to_string(),
            CourierError::PermissionDenied(reason) => reason.clone(),
            CourierError::InvalidFrame(reason) => reason.clone(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(e: serde_json::Error) -> Self {
        CourierError::Codec(e.to_string())
    }
}

pub type CourierResult<T> = Result<T, CourierError>;
