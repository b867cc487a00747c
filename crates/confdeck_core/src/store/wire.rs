//! Request and response bodies for the gateway `/api/config` endpoints.

use crate::error::FieldError;
use crate::path::DocPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `GET /api/config`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// `POST /api/config/apply`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub raw: String,
    #[serde(rename = "baseHash")]
    pub base_hash: String,
}

/// Successful `POST /api/config/apply`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// `PUT /api/config`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAllRequest {
    pub config: Value,
}

/// Hash-only acknowledgement returned by `PUT /api/config` and reload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Issue location as sent over the wire: segment list or dotted string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IssuePath {
    Segments(DocPath),
    Dotted(String),
}

impl IssuePath {
    pub fn into_doc_path(self) -> DocPath {
        match self {
            Self::Segments(path) => path,
            Self::Dotted(text) => DocPath::parse_dotted(&text),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub path: IssuePath,
    pub message: String,
}

impl From<Issue> for FieldError {
    fn from(issue: Issue) -> Self {
        FieldError::new(issue.path.into_doc_path(), issue.message)
    }
}

impl From<&FieldError> for Issue {
    fn from(error: &FieldError) -> Self {
        Self {
            path: IssuePath::Segments(error.path.clone()),
            message: error.message.clone(),
        }
    }
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}
