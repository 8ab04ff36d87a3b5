use std::time::Duration;

use thiserror::Error;
use tonic::{Code, Status};

use crate::pipeline::TickStage;

/// Failures while turning a tenant credential into a service token.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("identity sign-in request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity provider rejected sign-in with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("token exchange failed: {0}")]
    Exchange(Status),
}

/// Failures retrieving the day's export from object storage.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("object {object_name} not found in bucket {bucket}")]
    NotFound { bucket: String, object_name: String },
    #[error("failed to fetch {object_name}: {message}")]
    Transient {
        object_name: String,
        message: String,
    },
}

impl FetchError {
    pub fn object_name(&self) -> &str {
        match self {
            FetchError::NotFound { object_name, .. } => object_name,
            FetchError::Transient { object_name, .. } => object_name,
        }
    }
}

/// Failures delivering the payload to the import service.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("import service unreachable: {0}")]
    Transport(Status),
    #[error("import service rejected the payload: {0}")]
    Rejected(Status),
}

impl From<Status> for DispatchError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled | Code::Unknown => {
                DispatchError::Transport(status)
            }
            _ => DispatchError::Rejected(status),
        }
    }
}

/// Anything that ends a tick early. All variants are terminal for the tick only.
#[derive(Error, Debug)]
pub enum TickError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("tick timed out after {after:?} during {stage}")]
    TimedOut { stage: TickStage, after: Duration },
}

impl TickError {
    /// Stage name used in the failure log line and the failed-tick counter's `stage` label.
    pub fn stage(&self) -> &'static str {
        match self {
            TickError::Auth(_) => "authenticate",
            TickError::Fetch(_) => "fetch",
            TickError::Dispatch(_) => "dispatch",
            TickError::TimedOut { stage, .. } => stage.as_str(),
        }
    }
}
