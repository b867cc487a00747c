//! Shared test-only helpers for confdeck_core.

use crate::error::StoreError;
use crate::store::{
    ApplyOutcome, DocumentStore, LocalDocumentStore, LocalSnapshot, StoreSnapshot,
};
use crate::version::VersionToken;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct MemoryState {
    document: Value,
    revision: u64,
    schema: Option<Value>,
    unreachable: bool,
    reject_with: Option<StoreError>,
    normalize: Option<fn(&Value) -> Value>,
    write_after_apply: Option<Value>,
    reloads: usize,
}

/// In-memory [`DocumentStore`] with injectable failures.
///
/// The version token is the revision counter, bumped on every write.
#[derive(Debug, Clone)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub(crate) fn new(document: Value) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                document,
                revision: 1,
                schema: None,
                unreachable: false,
                reject_with: None,
                normalize: None,
                write_after_apply: None,
                reloads: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory store lock")
    }

    pub(crate) fn with_schema(self, schema: Value) -> Self {
        self.lock().schema = Some(schema);
        self
    }

    /// Make every call fail with a transport error.
    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Make the next writes fail with `err`.
    pub(crate) fn reject_writes_with(&self, err: Option<StoreError>) {
        self.lock().reject_with = err;
    }

    /// Rewrite applied documents before storing them.
    pub(crate) fn normalize_with(&self, normalize: fn(&Value) -> Value) {
        self.lock().normalize = Some(normalize);
    }

    /// Simulate a write by another editor.
    pub(crate) fn external_write(&self, document: Value) {
        let mut state = self.lock();
        state.document = document;
        state.revision += 1;
    }

    /// Land a write by another editor right after the next successful apply.
    pub(crate) fn write_after_next_apply(&self, document: Value) {
        self.lock().write_after_apply = Some(document);
    }

    pub(crate) fn document(&self) -> Value {
        self.lock().document.clone()
    }

    pub(crate) fn reloads(&self) -> usize {
        self.lock().reloads
    }

    fn token(revision: u64) -> VersionToken {
        VersionToken::new(format!("rev-{}", revision))
    }

    fn check_reachable(state: &MemoryState) -> Result<(), StoreError> {
        if state.unreachable {
            return Err(StoreError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self) -> Result<StoreSnapshot, StoreError> {
        let state = self.lock();
        Self::check_reachable(&state)?;
        Ok(StoreSnapshot {
            document: state.document.clone(),
            version: Some(Self::token(state.revision)),
            path: Some("memory://gateway.json".to_string()),
        })
    }

    fn schema(&self) -> Result<Value, StoreError> {
        let state = self.lock();
        Self::check_reachable(&state)?;
        state
            .schema
            .clone()
            .ok_or_else(|| StoreError::Unknown("no schema".to_string()))
    }

    fn apply(&self, raw: &str, base: &VersionToken) -> Result<ApplyOutcome, StoreError> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;
        if let Some(err) = state.reject_with.clone() {
            return Err(err);
        }
        if Self::token(state.revision) != *base {
            return Err(StoreError::Conflict);
        }
        let parsed: Value = serde_json::from_str(raw)
            .map_err(|err| StoreError::Malformed(err.to_string()))?;
        let stored = match state.normalize {
            Some(normalize) => normalize(&parsed),
            None => parsed,
        };
        state.document = stored.clone();
        state.revision += 1;
        let version = Self::token(state.revision);
        if let Some(other) = state.write_after_apply.take() {
            state.document = other;
            state.revision += 1;
        }
        Ok(ApplyOutcome {
            document: Some(stored),
            version: Some(version),
        })
    }

    fn set_all(&self, document: &Value) -> Result<(), StoreError> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;
        if let Some(err) = state.reject_with.clone() {
            return Err(err);
        }
        state.document = document.clone();
        state.revision += 1;
        Ok(())
    }

    fn reload(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;
        state.reloads += 1;
        Ok(())
    }
}

/// Tokenless [`DocumentStore`], the shape of a gateway that predates hashes.
#[derive(Debug, Clone)]
pub(crate) struct TokenlessStore(pub(crate) MemoryStore);

impl DocumentStore for TokenlessStore {
    fn get(&self) -> Result<StoreSnapshot, StoreError> {
        let mut snapshot = self.0.get()?;
        snapshot.version = None;
        Ok(snapshot)
    }

    fn schema(&self) -> Result<Value, StoreError> {
        self.0.schema()
    }

    fn apply(&self, raw: &str, base: &VersionToken) -> Result<ApplyOutcome, StoreError> {
        self.0.apply(raw, base)
    }

    fn set_all(&self, document: &Value) -> Result<(), StoreError> {
        self.0.set_all(document)
    }

    fn reload(&self) -> Result<(), StoreError> {
        self.0.reload()
    }
}

/// In-memory [`LocalDocumentStore`].
#[derive(Debug, Clone)]
pub(crate) struct MemoryLocalFile {
    document: Arc<Mutex<Value>>,
}

impl MemoryLocalFile {
    pub(crate) fn new(document: Value) -> Self {
        Self {
            document: Arc::new(Mutex::new(document)),
        }
    }

    pub(crate) fn document(&self) -> Value {
        self.document.lock().expect("local file lock").clone()
    }
}

impl LocalDocumentStore for MemoryLocalFile {
    fn get(&self) -> Result<LocalSnapshot, StoreError> {
        Ok(LocalSnapshot {
            document: self.document(),
            path: "/tmp/confdeck/gateway.json".to_string(),
        })
    }

    fn update(&self, document: &Value) -> Result<(), StoreError> {
        *self.document.lock().expect("local file lock") = document.clone();
        Ok(())
    }
}
