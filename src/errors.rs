use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error code the backend raises for an unknown workflow definition.
pub const DEFINITION_NOT_FOUND_CODE: &str = "P0001";

/// Structured error envelope returned by the data API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiFault {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl ApiFault {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for ApiFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "{} ({}): {}", code, self.status, self.message)
        } else {
            write!(f, "{}: {}", self.status, self.message)
        }
    }
}

/// Raw failure reported by a [`crate::Backend`] before translation.
///
/// Backends never hand these to callers directly; the clients translate every
/// fault into an [`Error`] at the collaborator boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("{0}")]
    Api(ApiFault),

    /// Network unreachable, connection reset, timeouts.
    #[error("{0}")]
    Transport(String),

    /// The backend answered but the body could not be decoded.
    #[error("{0}")]
    Decode(String),
}

impl From<ApiFault> for Fault {
    fn from(fault: ApiFault) -> Self {
        Fault::Api(fault)
    }
}

/// Convenience alias for fallible SDK results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type surfaced by the SDK.
///
/// Every variant carries a human-readable message and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Missing or malformed credentials, or the API client could not be built.
    #[error("{0}")]
    Config(String),

    /// Bad timing, tag or file parameters.
    #[error("{0}")]
    Validation(String),

    /// Unknown workflow definition or missing workflow instance.
    #[error("{0}")]
    NotFound(String),

    /// Any structured backend fault that is not specifically recognized.
    #[error("{0}")]
    BadRequest(String),

    /// The caller's user ID could not be resolved.
    #[error("{0}")]
    Lookup(String),

    #[error("{0}")]
    Upload(String),

    #[error("{0}")]
    Transport(String),

    /// The workflow instance reached the `FAILED` state.
    #[error("{0}")]
    WorkflowFailed(String),

    #[error("{0}")]
    TimedOut(String),
}

impl Error {
    pub fn message(&self) -> &str {
        match self {
            Error::Config(msg)
            | Error::Validation(msg)
            | Error::NotFound(msg)
            | Error::BadRequest(msg)
            | Error::Lookup(msg)
            | Error::Upload(msg)
            | Error::Transport(msg)
            | Error::WorkflowFailed(msg)
            | Error::TimedOut(msg) => msg,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub(crate) fn lookup_failed(fault: &Fault) -> Self {
        Error::Lookup(format!("Failed to look up user ID: {fault}"))
    }

    pub(crate) fn upload_failed(cause: impl fmt::Display) -> Self {
        Error::Upload(format!("File upload failed: {cause}"))
    }

    pub(crate) fn timed_out(timeout_secs: f64) -> Self {
        Error::TimedOut(format!(
            "Workflow execution timed out after {timeout_secs} seconds"
        ))
    }
}

/// Translates a fault raised by the submission or polling collaborator.
impl From<Fault> for Error {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Api(api) if api.code.as_deref() == Some(DEFINITION_NOT_FOUND_CODE) => {
                Error::NotFound("Workflow definition ID not found".to_string())
            }
            Fault::Api(_) => Error::BadRequest("Bad request".to_string()),
            Fault::Transport(cause) | Fault::Decode(cause) => {
                Error::Transport(format!("Request error occurred: {cause}"))
            }
        }
    }
}
