//! Error taxonomy for the sync engine.
//!
//! The pure parts of the engine (header resolution, fingerprinting, merging,
//! derivation, projection) never fail. Only the reconciler and the backend
//! wrappers produce these errors; the CLI layer wraps them in `anyhow`.

use thiserror::Error;

use crate::backend::ResourceKind;

/// Upload rejected before any backend call was made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown or empty file format. Check the headers and the contents.")]
    EmptyOrUnrecognized,
    #[error("Incorrect file for {resource}: missing required header(s) {}", missing.join(", "))]
    SchemaMismatch {
        resource: ResourceKind,
        missing: Vec<String>,
    },
    #[error(
        "Unknown file format. Supported: Pipeline, Companies trying to reach, List of advisors, List of investors."
    )]
    WrongTabContext,
}

/// Failure talking to the REST backend. Messages are the server's own text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Transport(String),
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Unauthorized(_) => Some(401),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Failed to read upload: {0}")]
    Sheet(String),
}

impl SyncError {
    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
