//! Client error types.

use thiserror::Error;

use taskscope_core::{CoreError, ListError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("invalid URL: {0}")]
    Url(String),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

impl From<ClientError> for ListError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Http(e) => ListError::Transport(e.to_string()),
            ClientError::Status { status, body } => ListError::Status { status, body },
            ClientError::Parse(msg) => ListError::Decode(msg),
            ClientError::Url(msg) => ListError::InvalidRequest(msg),
            ClientError::Invalid(e) => ListError::InvalidRequest(e.to_string()),
        }
    }
}
