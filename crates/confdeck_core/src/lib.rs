//! Core library for confdeck: a path-addressed JSON config editor with
//! patch-based undo/redo and optimistic-concurrency sync to a gateway.
//!
//! The layers build on each other:
//! [`path`] addresses values, [`diff`] computes and applies patches,
//! [`history`] bounds the undo stack, [`session`] owns the edited document,
//! and [`sync`] moves documents between a session and a [`store`].

/// Configuration loading and defaults.
pub mod config;
/// Shared constants.
pub mod constants;
/// Structural diff and patch application.
pub mod diff;
/// Store and validation error types.
pub mod error;
/// Bounded undo/redo stack of patches.
pub mod history;
/// Document paths and tree access.
pub mod path;
/// Editable document session.
pub mod session;
/// Document store contracts and implementations.
pub mod store;
/// Load/save controller.
pub mod sync;
/// Text helpers.
pub mod text;
/// Version tokens.
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use diff::{apply_patch, compute_patch, Direction, Patch, PatchEntry};
pub use error::{FieldError, StoreError};
pub use history::PatchHistory;
pub use path::{DocPath, PathSegment};
pub use session::{EditSession, SessionEvent};
pub use store::{DocumentStore, GatewayClient, LocalDocumentStore, LocalFileStore};
pub use sync::{LoadErrorCode, Stores, SyncController, SyncMode, SyncState};
pub use version::VersionToken;
