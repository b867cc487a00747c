//! In-memory configuration document with a path-addressed edit API.
//!
//! Every mutation builds the next document, diffs it against the current one
//! and records the resulting patch, so undo/redo never needs full snapshots.

use crate::diff::{compute_patch, Patch};
use crate::error::FieldError;
use crate::history::PatchHistory;
use crate::path::{get_in, write_in, DocPath};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Change notification delivered to session listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A mutation recorded a patch with `entries` changed locations.
    Edited { entries: usize },
    Undone,
    Redone,
    /// The document was re-seeded and history cleared.
    Reset,
}

/// Callback invoked after each session state change.
pub type SessionListener = Box<dyn FnMut(&SessionEvent) + Send>;

/// Editable document plus its undo history, dirty flag and save errors.
pub struct EditSession {
    document: Value,
    history: PatchHistory,
    dirty: bool,
    field_errors: Vec<FieldError>,
    errors_by_path: BTreeMap<String, String>,
    listeners: Vec<SessionListener>,
}

impl fmt::Debug for EditSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditSession")
            .field("document", &self.document)
            .field("history_len", &self.history.len())
            .field("dirty", &self.dirty)
            .field("field_errors", &self.field_errors)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EditSession {
    /// Start a clean session on `baseline` with room for `max_history` patches.
    pub fn new(baseline: Value, max_history: usize) -> Self {
        Self {
            document: baseline,
            history: PatchHistory::with_limit(max_history),
            dirty: false,
            field_errors: Vec::new(),
            errors_by_path: BTreeMap::new(),
            listeners: Vec::new(),
        }
    }

    /// Replace the document with a new baseline, dropping history, dirtiness
    /// and errors. Listeners stay registered.
    pub fn reset(&mut self, baseline: Value) {
        self.document = baseline;
        self.history.clear();
        self.dirty = false;
        self.clear_field_errors();
        self.notify(SessionEvent::Reset);
    }

    /// Register a listener called after every change.
    pub fn subscribe(&mut self, listener: impl FnMut(&SessionEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn history(&self) -> &PatchHistory {
        &self.history
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Value at `path`, or `None` when absent.
    pub fn get_field(&self, path: &DocPath) -> Option<&Value> {
        get_in(&self.document, path)
    }

    /// Write `value` at `path`.
    ///
    /// # Returns
    /// `true` when the document changed.
    pub fn set_field(&mut self, path: &DocPath, value: Value) -> bool {
        let mut next = self.document.clone();
        write_in(&mut next, path, Some(value));
        self.commit(next)
    }

    /// Remove the key or array element at `path`.
    ///
    /// # Returns
    /// `true` when the document changed.
    pub fn delete_field(&mut self, path: &DocPath) -> bool {
        let mut next = self.document.clone();
        write_in(&mut next, path, None);
        self.commit(next)
    }

    /// Append `value` to the array at `path`.
    ///
    /// A missing or non-array value is treated as an empty array.
    pub fn append_to_array(&mut self, path: &DocPath, value: Value) -> bool {
        let mut items = match self.get_field(path) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        items.push(value);
        self.set_field(path, Value::Array(items))
    }

    /// Remove element `index` from the array at `path`.
    ///
    /// No-op when the value at `path` is not an array or `index` is out of range.
    pub fn remove_from_array(&mut self, path: &DocPath, index: usize) -> bool {
        let Some(Value::Array(items)) = self.get_field(path) else {
            return false;
        };
        let remaining: Vec<Value> = items
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != index)
            .map(|(_, item)| item.clone())
            .collect();
        self.set_field(path, Value::Array(remaining))
    }

    /// Pretty-printed document with two-space indentation and stable key order.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.document).unwrap_or_else(|_| "{}".to_string())
    }

    /// Replace the whole document from JSON text.
    ///
    /// # Returns
    /// `false`, with no state change, when `text` is not valid JSON, its
    /// root is not an object, or it equals the current document.
    pub fn from_json(&mut self, text: &str) -> bool {
        let parsed = match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => {
                debug!("rejected import: root is not an object");
                return false;
            }
            Err(err) => {
                debug!("rejected import: {}", err);
                return false;
            }
        };
        let patch = Patch::replace_root(&self.document, &parsed);
        self.record(parsed, patch)
    }

    /// Step back one recorded patch.
    ///
    /// # Returns
    /// `false` at the baseline.
    pub fn undo(&mut self) -> bool {
        if !self.history.undo(&mut self.document) {
            return false;
        }
        self.after_history_step(SessionEvent::Undone);
        true
    }

    /// Re-apply the next recorded patch.
    ///
    /// # Returns
    /// `false` when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        if !self.history.redo(&mut self.document) {
            return false;
        }
        self.after_history_step(SessionEvent::Redone);
        true
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    /// Save error messages keyed by dotted path.
    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors_by_path
    }

    /// Message for the field at `dotted` path, if the last save flagged it.
    pub fn field_error(&self, dotted: &str) -> Option<&str> {
        self.errors_by_path.get(dotted).map(String::as_str)
    }

    pub(crate) fn set_field_errors(&mut self, errors: Vec<FieldError>) {
        self.errors_by_path = errors
            .iter()
            .map(|error| (error.path.to_dotted(), error.message.clone()))
            .collect();
        self.field_errors = errors;
    }

    pub(crate) fn take_listeners(&mut self) -> Vec<SessionListener> {
        std::mem::take(&mut self.listeners)
    }

    pub(crate) fn attach_listeners(&mut self, listeners: Vec<SessionListener>) {
        self.listeners.extend(listeners);
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn clear_field_errors(&mut self) {
        self.field_errors.clear();
        self.errors_by_path.clear();
    }

    fn commit(&mut self, next: Value) -> bool {
        let patch = compute_patch(&self.document, &next);
        self.record(next, patch)
    }

    fn record(&mut self, next: Value, patch: Patch) -> bool {
        if patch.is_empty() {
            return false;
        }
        let entries = patch.len();
        self.document = next;
        self.history.push(patch);
        self.dirty = true;
        self.clear_field_errors();
        self.notify(SessionEvent::Edited { entries });
        true
    }

    // Undo/redo mark the session dirty even when the result matches the last
    // saved baseline.
    fn after_history_step(&mut self, event: SessionEvent) {
        self.dirty = true;
        self.clear_field_errors();
        self.notify(event);
    }

    fn notify(&mut self, event: SessionEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()), crate::constants::DEFAULT_MAX_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn session(doc: Value) -> EditSession {
        EditSession::new(doc, 50)
    }

    fn port_path() -> DocPath {
        DocPath::from(["gateway", "port"])
    }

    #[test]
    fn set_field_then_undo_restores_port() {
        let mut session = session(json!({"gateway": {"port": 18789}}));
        assert!(session.set_field(&port_path(), json!(19000)));
        assert_eq!(session.get_field(&port_path()), Some(&json!(19000)));
        assert!(session.is_dirty());
        assert!(session.can_undo());

        assert!(session.undo());
        assert_eq!(session.get_field(&port_path()), Some(&json!(18789)));
        assert!(!session.can_undo());
        assert!(session.can_redo());
    }

    #[test]
    fn append_and_remove_array_items() {
        let allow = DocPath::from(["tools", "allow"]);
        let mut session = session(json!({"tools": {"allow": ["ls"]}}));
        session.append_to_array(&allow, json!("bash"));
        assert_eq!(session.get_field(&allow), Some(&json!(["ls", "bash"])));
        session.remove_from_array(&allow, 0);
        assert_eq!(session.get_field(&allow), Some(&json!(["bash"])));
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history().entries()[0].entries()[0].path, allow);
    }

    #[test]
    fn append_to_missing_or_scalar_starts_new_array() {
        let mut session = session(json!({"tools": {"deny": "rm"}}));
        session.append_to_array(&DocPath::from(["tools", "allow"]), json!("ls"));
        session.append_to_array(&DocPath::from(["tools", "deny"]), json!("curl"));
        assert_eq!(
            session.document(),
            &json!({"tools": {"deny": ["curl"], "allow": ["ls"]}})
        );
    }

    #[test]
    fn remove_from_non_array_is_noop() {
        let mut session = session(json!({"tools": {"allow": "ls"}}));
        assert!(!session.remove_from_array(&DocPath::from(["tools", "allow"]), 0));
        assert!(!session.remove_from_array(&DocPath::from(["tools", "missing"]), 0));
        assert!(!session.is_dirty());
        assert!(!session.can_undo());
    }

    #[test]
    fn delete_field_removes_key() {
        let mut session = session(json!({"gateway": {"port": 1, "bind": "lan"}}));
        assert!(session.delete_field(&DocPath::from(["gateway", "bind"])));
        assert_eq!(session.document(), &json!({"gateway": {"port": 1}}));
        assert!(!session.delete_field(&DocPath::from(["gateway", "bind"])));
        session.undo();
        assert_eq!(session.get_field(&DocPath::from(["gateway", "bind"])), Some(&json!("lan")));
    }

    #[test]
    fn same_value_write_records_nothing() {
        let mut session = session(json!({"gateway": {"port": 18789}}));
        assert!(!session.set_field(&port_path(), json!(18789)));
        assert!(!session.is_dirty());
        assert!(!session.can_undo());
    }

    #[test]
    fn invalid_import_is_inert() {
        let mut session = session(json!({"a": 1}));
        session.set_field_errors(vec![FieldError::new(DocPath::from(["a"]), "bad")]);
        assert!(!session.from_json("{not json"));
        assert!(!session.from_json("[1, 2]"));
        assert_eq!(session.document(), &json!({"a": 1}));
        assert!(!session.is_dirty());
        assert_eq!(session.field_error("a"), Some("bad"));
    }

    #[test]
    fn import_replaces_document_as_one_root_entry() {
        let mut session = session(json!({"a": 1, "b": {"c": 2}}));
        assert!(session.from_json(r#"{"z": true}"#));
        assert_eq!(session.document(), &json!({"z": true}));
        assert!(session.is_dirty());
        let patch = &session.history().entries()[0];
        assert_eq!(patch.len(), 1);
        assert!(patch.entries()[0].path.is_root());
        session.undo();
        assert_eq!(session.document(), &json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn importing_the_current_document_is_a_noop() {
        let mut session = session(json!({"a": 1, "b": 2}));
        assert!(!session.from_json(r#"{"b": 2, "a": 1}"#));
        assert!(!session.is_dirty());
        assert!(!session.can_undo());
    }

    #[test]
    fn undoing_a_delete_keeps_key_order() {
        let mut session = session(json!({"a": 1, "b": 2}));
        assert!(session.delete_field(&DocPath::from(["a"])));
        assert!(session.undo());
        assert_eq!(session.to_json(), "{\n  \"a\": 1,\n  \"b\": 2\n}");
    }

    #[test]
    fn to_json_is_pretty_and_keeps_key_order() {
        let session = session(json!({"zeta": 1, "alpha": {"beta": true}}));
        assert_eq!(
            session.to_json(),
            "{\n  \"zeta\": 1,\n  \"alpha\": {\n    \"beta\": true\n  }\n}"
        );
    }

    #[test]
    fn mutation_clears_field_errors() {
        let mut session = session(json!({"gateway": {"port": 0}}));
        session.set_field_errors(vec![FieldError::new(port_path(), "must be >= 1")]);
        assert_eq!(session.field_error("gateway.port"), Some("must be >= 1"));
        session.set_field(&port_path(), json!(80));
        assert!(session.field_errors().is_empty());
        assert!(session.errors().is_empty());
    }

    #[test]
    fn undo_and_redo_mark_dirty_even_back_at_baseline() {
        let mut session = session(json!({"a": 1}));
        session.set_field(&DocPath::from(["a"]), json!(2));
        session.mark_clean();
        session.undo();
        assert_eq!(session.document(), &json!({"a": 1}));
        assert!(session.is_dirty());

        session.mark_clean();
        assert!(!session.undo());
        assert!(!session.is_dirty(), "boundary no-op leaves dirty unchanged");
    }

    #[test]
    fn undo_n_then_redo_n_restores_latest_document() {
        let mut session = session(json!({}));
        let steps: usize = 6;
        for n in 0..steps {
            session.set_field(&DocPath::from(["items"]).child(n), json!(n));
            session.set_field(&DocPath::from(["count"]), json!(n + 1));
        }
        let latest = session.document().clone();
        for _ in 0..steps * 2 {
            assert!(session.undo());
        }
        assert_eq!(session.document(), &json!({}));
        assert!(!session.can_undo());
        for _ in 0..steps * 2 {
            assert!(session.redo());
        }
        assert_eq!(session.document(), &latest);
        assert!(!session.can_redo());
    }

    #[test]
    fn listeners_see_each_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut session = session(json!({}));
        session.subscribe(move |event| sink.lock().expect("events").push(*event));

        session.set_field(&DocPath::from(["a"]), json!(1));
        session.undo();
        session.redo();
        session.reset(json!({"b": 2}));

        assert_eq!(
            *seen.lock().expect("events"),
            vec![
                SessionEvent::Edited { entries: 1 },
                SessionEvent::Undone,
                SessionEvent::Redone,
                SessionEvent::Reset,
            ]
        );
    }
}
