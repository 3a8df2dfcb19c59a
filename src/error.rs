//! Errors surfaced by the hub client

use thiserror::Error;

use crate::protocol::WsError;

pub type HubResult<T> = Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub connection is not configured")]
    NotConfigured,

    #[error("not connected to the hub")]
    Disconnected,

    #[error("authentication rejected: {0}")]
    AuthInvalid(String),

    #[error("hub rejected command ({code}): {message}")]
    Command { code: String, message: String },

    #[error("timed out waiting for the hub")]
    Timeout,

    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("unexpected payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<WsError> for HubError {
    fn from(err: WsError) -> Self {
        Self::Command {
            code: err.code,
            message: err.message,
        }
    }
}

impl HubError {
    /// Server-provided error code for rejected commands
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Command { code, .. } => Some(code),
            _ => None,
        }
    }
}
