//! Document store contracts and their implementations.
//!
//! [`DocumentStore`] is the authoritative source (normally the gateway);
//! [`LocalDocumentStore`] is the token-less file fallback used when the
//! gateway cannot be reached in local mode.

/// File-backed store.
pub mod local;
/// HTTP client for the gateway config API.
pub mod remote;
/// JSON payloads exchanged with the gateway.
pub mod wire;

pub use local::LocalFileStore;
pub use remote::GatewayClient;

use crate::error::StoreError;
use crate::version::VersionToken;
use serde_json::Value;

/// Document read from a [`DocumentStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub document: Value,
    pub version: Option<VersionToken>,
    /// Location of the backing file, when the store reports one.
    pub path: Option<String>,
}

/// Result of a successful compare-and-swap apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    /// Document as stored, which may be normalized relative to what was sent.
    pub document: Option<Value>,
    pub version: Option<VersionToken>,
}

/// Document read from a [`LocalDocumentStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSnapshot {
    pub document: Value,
    pub path: String,
}

/// Authoritative configuration store with optimistic concurrency.
pub trait DocumentStore: Send + Sync {
    /// Read the current document and its version token.
    fn get(&self) -> Result<StoreSnapshot, StoreError>;

    /// Read the schema document used as an editing hint.
    fn schema(&self) -> Result<Value, StoreError>;

    /// Replace the document with `raw` if the store still matches `base`.
    ///
    /// # Errors
    /// [`StoreError::Conflict`] when `base` is stale and
    /// [`StoreError::Validation`] when the document is rejected.
    fn apply(&self, raw: &str, base: &VersionToken) -> Result<ApplyOutcome, StoreError>;

    /// Overwrite the document without a version check.
    fn set_all(&self, document: &Value) -> Result<(), StoreError>;

    /// Ask the store to reload its configuration.
    fn reload(&self) -> Result<(), StoreError>;
}

/// Last-write-wins file access used when the primary store is unreachable.
pub trait LocalDocumentStore: Send + Sync {
    fn get(&self) -> Result<LocalSnapshot, StoreError>;

    fn update(&self, document: &Value) -> Result<(), StoreError>;
}
