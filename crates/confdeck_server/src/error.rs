use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use confdeck_core::error::{FieldError, StoreError};
use confdeck_core::store::wire::{ErrorBody, Issue};
use thiserror::Error;

/// Error returned by config API handlers.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config changed since it was read")]
    Conflict,

    #[error("{message}")]
    Invalid {
        message: String,
        issues: Vec<FieldError>,
    },

    #[error("Stored config is malformed: {0}")]
    Malformed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HttpError {
    pub fn invalid(message: impl Into<String>, issues: Vec<FieldError>) -> Self {
        Self::Invalid {
            message: message.into(),
            issues,
        }
    }
}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::Conflict,
            StoreError::Validation { message, issues } => Self::Invalid { message, issues },
            StoreError::Malformed(message) => Self::Malformed(message),
            StoreError::Transport(message) | StoreError::Unknown(message) => {
                Self::Internal(message)
            }
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            HttpError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: format!("{} not found", what),
                    issues: Vec::new(),
                },
            ),
            HttpError::Conflict => (
                StatusCode::CONFLICT,
                ErrorBody {
                    error: "Config changed since it was read; reload and retry".to_string(),
                    issues: Vec::new(),
                },
            ),
            HttpError::Invalid { message, issues } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message,
                    issues: issues.iter().map(Issue::from).collect(),
                },
            ),
            HttpError::Malformed(message) => {
                tracing::warn!("Stored config is malformed: {}", message);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorBody {
                        error: message,
                        issues: Vec::new(),
                    },
                )
            }
            HttpError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "Internal server error".to_string(),
                        issues: Vec::new(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Failure while preparing or starting the gateway.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to read schema {path}: {reason}")]
    Schema { path: String, reason: String },

    #[error("Server startup failed: {0}")]
    Startup(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
