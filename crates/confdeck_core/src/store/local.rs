//! JSON config file on local disk.
//!
//! Serves both as the token-less fallback ([`LocalDocumentStore`]) and as a
//! full [`DocumentStore`] whose version token is the fingerprint of the file
//! bytes. The gateway server persists through this type.

use super::{ApplyOutcome, DocumentStore, LocalDocumentStore, LocalSnapshot, StoreSnapshot};
use crate::error::{FieldError, StoreError};
use crate::path::DocPath;
use crate::version::VersionToken;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// File-backed configuration store.
#[derive(Debug)]
pub struct LocalFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    /// Raw file bytes; a missing file reads as empty.
    fn read_raw(&self) -> Result<Vec<u8>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(StoreError::Unknown(format!(
                "Failed to read {}: {}",
                self.path.display(),
                err
            ))),
        }
    }

    fn parse(&self, raw: &[u8]) -> Result<Value, StoreError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(Map::new()));
        }
        let document: Value = serde_json::from_slice(raw).map_err(|err| {
            StoreError::Malformed(format!("{} is not valid JSON: {}", self.path.display(), err))
        })?;
        if !document.is_object() {
            return Err(StoreError::Malformed(format!(
                "{} must contain a JSON object",
                self.path.display()
            )));
        }
        Ok(document)
    }

    /// Replace the file contents via a temp file and rename.
    fn write_raw(&self, raw: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                StoreError::Unknown(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    err
                ))
            })?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, raw).map_err(|err| {
            StoreError::Unknown(format!("Failed to write {}: {}", tmp_path.display(), err))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|err| {
            StoreError::Unknown(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                err
            ))
        })
    }

    fn encode(document: &Value) -> Result<Vec<u8>, StoreError> {
        let mut raw = serde_json::to_vec_pretty(document)
            .map_err(|err| StoreError::Unknown(format!("Failed to encode config: {}", err)))?;
        raw.push(b'\n');
        Ok(raw)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Unknown("Config file lock is poisoned".to_string()))
    }

    fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let raw = self.read_raw()?;
        let document = self.parse(&raw)?;
        Ok(StoreSnapshot {
            document,
            version: Some(VersionToken::fingerprint(&raw)),
            path: Some(self.display_path()),
        })
    }
}

impl DocumentStore for LocalFileStore {
    fn get(&self) -> Result<StoreSnapshot, StoreError> {
        let _guard = self.lock()?;
        self.snapshot()
    }

    fn schema(&self) -> Result<Value, StoreError> {
        Err(StoreError::Unknown(
            "Local config files do not carry a schema".to_string(),
        ))
    }

    fn apply(&self, raw: &str, base: &VersionToken) -> Result<ApplyOutcome, StoreError> {
        let document: Value = serde_json::from_str(raw).map_err(|err| StoreError::Validation {
            message: "Config is not valid JSON".to_string(),
            issues: vec![FieldError::new(DocPath::root(), err.to_string())],
        })?;
        if !document.is_object() {
            return Err(StoreError::Validation {
                message: "Config root must be an object".to_string(),
                issues: vec![FieldError::new(DocPath::root(), "expected an object")],
            });
        }

        let _guard = self.lock()?;
        let current = self.read_raw()?;
        if VersionToken::fingerprint(&current) != *base {
            return Err(StoreError::Conflict);
        }
        let encoded = Self::encode(&document)?;
        self.write_raw(&encoded)?;
        info!("applied config to {}", self.path.display());
        Ok(ApplyOutcome {
            document: Some(document),
            version: Some(VersionToken::fingerprint(&encoded)),
        })
    }

    fn set_all(&self, document: &Value) -> Result<(), StoreError> {
        let encoded = Self::encode(document)?;
        let _guard = self.lock()?;
        self.write_raw(&encoded)
    }

    fn reload(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl LocalDocumentStore for LocalFileStore {
    fn get(&self) -> Result<LocalSnapshot, StoreError> {
        let _guard = self.lock()?;
        let raw = self.read_raw()?;
        Ok(LocalSnapshot {
            document: self.parse(&raw)?,
            path: self.display_path(),
        })
    }

    fn update(&self, document: &Value) -> Result<(), StoreError> {
        DocumentStore::set_all(self, document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> LocalFileStore {
        LocalFileStore::new(dir.path().join("nested").join("gateway.json"))
    }

    #[test]
    fn missing_file_reads_as_empty_object() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        let snapshot = DocumentStore::get(&store).expect("snapshot");
        assert_eq!(snapshot.document, json!({}));
        assert_eq!(snapshot.version, Some(VersionToken::fingerprint(b"")));
        assert!(snapshot.path.expect("path").ends_with("gateway.json"));
    }

    #[test]
    fn update_then_get_round_trips_document() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        let doc = json!({"gateway": {"port": 18789}});
        store.update(&doc).expect("update");
        let snapshot = LocalDocumentStore::get(&store).expect("get");
        assert_eq!(snapshot.document, doc);
        let raw = fs::read_to_string(store.path()).expect("read");
        assert!(raw.ends_with("}\n"));
    }

    #[test]
    fn apply_checks_version_and_returns_new_token() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        store.set_all(&json!({"a": 1})).expect("seed");
        let base = DocumentStore::get(&store).expect("get").version.expect("token");

        let outcome = store.apply(r#"{"a": 2}"#, &base).expect("apply");
        assert_eq!(outcome.document, Some(json!({"a": 2})));
        let fresh = DocumentStore::get(&store).expect("get");
        assert_eq!(outcome.version, fresh.version);

        let stale = store.apply(r#"{"a": 3}"#, &base);
        assert!(matches!(stale, Err(StoreError::Conflict)));
        assert_eq!(DocumentStore::get(&store).expect("get").document, json!({"a": 2}));
    }

    #[test]
    fn apply_rejects_non_object_documents() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        let base = DocumentStore::get(&store).expect("get").version.expect("token");
        let err = store.apply("[1]", &base).expect_err("array root");
        assert_eq!(err.issues().len(), 1);
        let err = store.apply("{oops", &base).expect_err("bad json");
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        store.set_all(&json!({})).expect("seed dir");
        fs::write(store.path(), "not json").expect("corrupt");
        let err = DocumentStore::get(&store).expect_err("malformed");
        assert!(matches!(err, StoreError::Malformed(_)));
    }
}
