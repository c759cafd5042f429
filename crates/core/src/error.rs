use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unknown task state: {0}")]
    InvalidState(String),

    #[error("unknown mutation kind: {0}")]
    InvalidMutation(String),

    #[error("{kind} is not supported for {state} tasks")]
    UnsupportedMutation { kind: String, state: String },

    #[error("aggregating tasks in queue {0} require a group")]
    MissingGroup(String),

    #[error("{0}")]
    Other(String),
}

/// Failure reported by a [`crate::TaskLister`] while reading a page.
#[derive(Error, Debug, Clone)]
pub enum ListError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response decode error: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
