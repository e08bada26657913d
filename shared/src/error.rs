use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy for the report access layer. Every provider failure maps
/// into one of these; the message is surfaced to the caller unchanged.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// A lookup missed (unknown employee ID, missing record).
    #[error("{0}")]
    NotFound(String),
    /// A uniqueness or provisioning conflict (duplicate employee ID,
    /// mis-provisioned account).
    #[error("{0}")]
    Conflict(String),
    /// The provider rejected the credentials.
    #[error("{0}")]
    Unauthorized(String),
    /// Network or provider failure.
    #[error("{0}")]
    Transport(String),
}

impl DataError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Stable machine-readable tag, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::Conflict(_) => "Conflict",
            Self::Unauthorized(_) => "Unauthorized",
            Self::Transport(_) => "Transport",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Unauthorized(_) => 401,
            Self::Transport(_) => 500,
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        DataError::Transport(format!("database error: {err}"))
    }
}

/// JSON error body shared by all API responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn from_error(err: &DataError) -> Self {
        Self {
            error: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
