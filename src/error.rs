//! Crate-level error types.
//!
//! [`FeedError`] covers every fallible path in the client: transport loss,
//! protocol decoding, document surgery, uploads and configuration.
//! [`DomError`] is kept separate because document operations fail for a much
//! narrower set of reasons and handlers usually log-and-skip them.

use thiserror::Error;

use crate::protocol::MessageId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FeedError>;

#[derive(Debug, Error)]
pub enum FeedError {
    /// The socket was not open when a send was attempted. Fatal: the caller
    /// has already been asked to reload.
    #[error("connection lost; reload requested")]
    ConnectionLost,

    /// A frame carried a known task tag but its fields did not decode.
    #[error("malformed '{task}' frame: {detail}")]
    Protocol { task: String, detail: String },

    /// A text frame had no `task` field at all.
    #[error("frame has no task tag")]
    MissingTask,

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document: {0}")]
    Dom(#[from] DomError),

    /// A file read for an upload batch failed or was aborted.
    #[error("upload read failed for '{name}': {detail}")]
    UploadRead { name: String, detail: String },

    /// A file read returned a different byte count than the size recorded at
    /// call time; the frame offsets would be wrong.
    #[error("upload '{name}' changed size: expected {expected} bytes, read {actual}")]
    UploadSizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Failures of [`crate::dom::Document`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("element '{0}' not found")]
    NotFound(String),

    #[error("element '{0}' already exists")]
    Duplicate(String),

    /// Placement is not meaningful for the anchor (e.g. inserting a sibling
    /// of a top-level container).
    #[error("cannot place relative to '{0}'")]
    InvalidPlacement(String),
}

impl FeedError {
    /// Whether this error ends the session (and therefore the page).
    pub fn is_fatal(&self) -> bool {
        matches!(self, FeedError::ConnectionLost | FeedError::WebSocket(_))
    }

    pub(crate) fn protocol(task: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        FeedError::Protocol {
            task: task.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn missing_message(id: MessageId) -> Self {
        FeedError::Dom(DomError::NotFound(id.element_id()))
    }
}
