//! Error types shared by document stores and the sync controller.
use crate::path::DocPath;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failure attached to one document location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: DocPath,
    pub message: String,
}

impl FieldError {
    pub fn new(path: DocPath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

/// Failure reported by a document store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Gateway unreachable: {0}")]
    Transport(String),

    #[error("Config changed since it was loaded; reload and reapply your edits")]
    Conflict,

    #[error("{message}")]
    Validation {
        message: String,
        issues: Vec<FieldError>,
    },

    #[error("Malformed config: {0}")]
    Malformed(String),

    #[error("{0}")]
    Unknown(String),
}

impl StoreError {
    /// `true` when the store could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Structured validation issues carried by the error, if any.
    pub fn issues(&self) -> &[FieldError] {
        match self {
            Self::Validation { issues, .. } => issues,
            _ => &[],
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_connect() || value.is_timeout() || value.is_request() {
            Self::Transport(value.to_string())
        } else if value.is_decode() {
            Self::Malformed(value.to_string())
        } else {
            Self::Unknown(value.to_string())
        }
    }
}
