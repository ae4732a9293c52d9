//! Error types for fclite.

use thiserror::Error;

/// Result alias used across fclite crates.
pub type FcliteResult<T> = Result<T, FcliteError>;

#[derive(Debug, Error)]
pub enum FcliteError {
    /// A handler with the same name already exists in the target list.
    #[error("handler already exists: {0}")]
    DuplicateName(String),

    /// The referenced handler name is not present in the list.
    #[error("handler not found: {0}")]
    AnchorNotFound(String),

    /// A handler's task failed while its list was running.
    #[error("handler {step} failed: {source}")]
    StepExecution {
        step: String,
        #[source]
        source: Box<FcliteError>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("process error: {0}")]
    Process(String),

    /// Non-success response from the hypervisor API.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FcliteError {
    /// Name of the handler that failed, if this is a handler failure.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            FcliteError::StepExecution { step, .. } => Some(step),
            _ => None,
        }
    }
}
