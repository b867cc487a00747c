use super::*;
use crate::test_support::{MemoryLocalFile, MemoryStore, TokenlessStore};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn controller(store: &MemoryStore, mode: SyncMode) -> SyncController {
    SyncController::new(Stores::new(Arc::new(store.clone())), mode)
}

fn path(dotted: &str) -> DocPath {
    DocPath::parse_dotted(dotted)
}

fn poll_until(controller: &mut SyncController, done: impl Fn(&SyncController) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(controller) && Instant::now() < deadline {
        controller.poll();
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn load_then_edit_then_undo_restores_loaded_value() {
    let store = MemoryStore::new(json!({"gateway": {"port": 18789}}));
    let mut controller = controller(&store, SyncMode::Remote);
    assert_eq!(controller.state(), SyncState::Idle);

    assert!(controller.load());
    assert_eq!(controller.state(), SyncState::Ready);
    assert!(!controller.is_dirty());
    assert!(controller.version().is_some());
    assert_eq!(controller.config_path(), Some("memory://gateway.json"));

    assert!(controller.set_field(&path("gateway.port"), json!(19000)));
    assert_eq!(controller.get_field(&path("gateway.port")), Some(&json!(19000)));
    assert!(controller.is_dirty());
    assert!(controller.can_undo());

    assert!(controller.undo());
    assert_eq!(controller.get_field(&path("gateway.port")), Some(&json!(18789)));
    assert!(!controller.can_undo());
}

#[test]
fn save_with_stale_version_fails_and_keeps_local_edits() {
    let store = MemoryStore::new(json!({"gateway": {"port": 18789}}));
    let mut controller = controller(&store, SyncMode::Remote);
    assert!(controller.load());
    controller.set_field(&path("gateway.port"), json!(19000));
    store.external_write(json!({"gateway": {"port": 20000}}));

    assert!(!controller.save());
    assert_eq!(controller.state(), SyncState::SaveError);
    assert!(!controller.save_error().unwrap_or_default().is_empty());
    assert_eq!(
        controller.document(),
        Some(&json!({"gateway": {"port": 19000}}))
    );
    assert!(controller.is_dirty());
    assert_eq!(store.document(), json!({"gateway": {"port": 20000}}));

    // Conflicts fail closed: a reload picks up the external write.
    assert!(controller.reload());
    assert!(!controller.is_dirty());
    assert_eq!(controller.get_field(&path("gateway.port")), Some(&json!(20000)));
}

#[test]
fn successful_save_marks_clean_and_refreshes_version() {
    let store = MemoryStore::new(json!({"gateway": {"port": 18789}}));
    let mut controller = controller(&store, SyncMode::Remote);
    assert!(controller.load());
    let before = controller.version().cloned();

    controller.set_field(&path("gateway.bind"), json!("loopback"));
    assert!(controller.save());
    assert_eq!(controller.state(), SyncState::Ready);
    assert!(!controller.is_dirty());
    assert!(controller.save_error().is_none());
    assert!(controller.last_saved_at().is_some());
    assert_ne!(controller.version().cloned(), before);
    assert_eq!(
        store.document(),
        json!({"gateway": {"port": 18789, "bind": "loopback"}})
    );
    // History survives a save that the store accepted verbatim.
    assert!(controller.can_undo());

    controller.set_field(&path("gateway.port"), json!(1));
    assert!(controller.save(), "refreshed token must allow a second save");
}

#[test]
fn write_landing_after_apply_still_conflicts_on_next_save() {
    let store = MemoryStore::new(json!({"a": 1}));
    let mut controller = controller(&store, SyncMode::Remote);
    assert!(controller.load());

    controller.set_field(&path("a"), json!(2));
    store.write_after_next_apply(json!({"a": "theirs"}));
    assert!(controller.save());
    assert_eq!(controller.version().map(VersionToken::as_str), Some("rev-2"));

    controller.set_field(&path("b"), json!(3));
    assert!(!controller.save());
    assert_eq!(controller.state(), SyncState::SaveError);
    assert_eq!(store.document(), json!({"a": "theirs"}));
}

#[test]
fn save_adopts_normalized_document_as_new_baseline() {
    fn stamp(document: &Value) -> Value {
        let mut stamped = document.clone();
        if let Some(map) = stamped.as_object_mut() {
            map.insert("meta".to_string(), json!({"normalized": true}));
        }
        stamped
    }

    let store = MemoryStore::new(json!({"a": 1}));
    store.normalize_with(stamp);
    let mut controller = controller(&store, SyncMode::Remote);
    assert!(controller.load());
    controller.set_field(&path("a"), json!(2));

    assert!(controller.save());
    assert_eq!(
        controller.document(),
        Some(&json!({"a": 2, "meta": {"normalized": true}}))
    );
    assert!(!controller.is_dirty());
    assert!(!controller.can_undo());
}

#[test]
fn validation_issues_become_field_errors_until_next_edit() {
    let store = MemoryStore::new(json!({"gateway": {"port": 18789}}));
    let mut controller = controller(&store, SyncMode::Remote);
    assert!(controller.load());
    controller.set_field(&path("gateway.port"), json!("not-a-port"));

    store.reject_writes_with(Some(StoreError::Validation {
        message: "invalid config".to_string(),
        issues: vec![FieldError::new(path("gateway.port"), "expected integer")],
    }));
    assert!(!controller.save());
    assert_eq!(controller.save_error(), Some("invalid config"));
    assert_eq!(controller.field_errors().len(), 1);
    assert_eq!(
        controller.errors().get("gateway.port").map(String::as_str),
        Some("expected integer")
    );
    assert!(controller.is_dirty());

    controller.set_field(&path("gateway.port"), json!(19000));
    assert!(controller.errors().is_empty());

    store.reject_writes_with(None);
    assert!(controller.save());
    assert_eq!(controller.state(), SyncState::Ready);
}

#[test]
fn save_without_loaded_document_returns_false() {
    let store = MemoryStore::new(json!({}));
    let mut controller = controller(&store, SyncMode::Remote);
    assert!(!controller.save());
    assert!(controller.request_save().is_none());
    assert_eq!(controller.state(), SyncState::Idle);
    assert!(!controller.set_field(&path("a"), json!(1)));
    assert!(controller.to_json().is_none());
}

#[test]
fn unreachable_gateway_in_remote_mode_reports_load_error() {
    let store = MemoryStore::new(json!({}));
    store.set_unreachable(true);
    let local = MemoryLocalFile::new(json!({"a": 1}));
    let stores = Stores::new(Arc::new(store.clone())).with_local(Arc::new(local));
    let mut controller = SyncController::new(stores, SyncMode::Remote);

    assert!(!controller.load());
    assert_eq!(controller.state(), SyncState::LoadError);
    assert_eq!(controller.load_error_code(), Some(LoadErrorCode::Unreachable));
    assert!(controller.load_error().is_some());
    assert!(controller.document().is_none());
}

#[test]
fn local_mode_falls_back_to_config_file_for_load_and_save() {
    let store = MemoryStore::new(json!({}));
    store.set_unreachable(true);
    let local = MemoryLocalFile::new(json!({"tools": {"allow": ["ls"]}}));
    let stores = Stores::new(Arc::new(store.clone())).with_local(Arc::new(local.clone()));
    let mut controller = SyncController::new(stores, SyncMode::Local);

    assert!(controller.load());
    assert!(controller.loaded_from_fallback());
    assert!(controller.version().is_none());
    assert_eq!(controller.config_path(), Some("/tmp/confdeck/gateway.json"));

    controller.append_to_array(&path("tools.allow"), json!("bash"));
    assert!(controller.save());
    assert!(!controller.is_dirty());
    assert_eq!(local.document(), json!({"tools": {"allow": ["ls", "bash"]}}));
}

#[test]
fn tokenless_store_saves_with_set_all_and_reload() {
    let store = MemoryStore::new(json!({"a": 1}));
    let stores = Stores::new(Arc::new(TokenlessStore(store.clone())));
    let mut controller = SyncController::new(stores, SyncMode::Remote);
    assert!(controller.load());
    assert!(controller.version().is_none());

    controller.set_field(&path("a"), json!(5));
    assert!(controller.save());
    assert_eq!(store.document(), json!({"a": 5}));
    assert_eq!(store.reloads(), 1);
}

#[test]
fn tokenless_save_writes_local_file_when_gateway_goes_away() {
    let store = MemoryStore::new(json!({"a": 1}));
    let local = MemoryLocalFile::new(json!({"a": 1}));
    let stores = Stores::new(Arc::new(TokenlessStore(store.clone())))
        .with_local(Arc::new(local.clone()));
    let mut controller = SyncController::new(stores, SyncMode::Local);
    assert!(controller.load());
    assert!(!controller.loaded_from_fallback());

    store.set_unreachable(true);
    controller.set_field(&path("a"), json!(2));
    assert!(controller.save());
    assert_eq!(local.document(), json!({"a": 2}));
    assert_eq!(store.document(), json!({"a": 1}));
}

#[test]
fn schema_is_fetched_after_load() {
    let schema = json!({"type": "object"});
    let store = MemoryStore::new(json!({})).with_schema(schema.clone());
    let mut controller = controller(&store, SyncMode::Remote);
    assert!(controller.load());
    poll_until(&mut controller, |c| c.schema().is_some());
    assert_eq!(controller.schema(), Some(&schema));
}

#[test]
fn missing_schema_does_not_fail_load() {
    let store = MemoryStore::new(json!({"a": 1}));
    let mut controller = controller(&store, SyncMode::Remote);
    assert!(controller.load());
    thread::sleep(Duration::from_millis(20));
    controller.poll();
    assert_eq!(controller.state(), SyncState::Ready);
    assert!(controller.schema().is_none());
    assert!(controller.load_error().is_none());
}

#[test]
fn superseded_load_completion_is_discarded() {
    let store = MemoryStore::new(json!({"v": "first"}));
    let mut controller = controller(&store, SyncMode::Remote);
    let first = controller.request_load();
    store.external_write(json!({"v": "second"}));
    let second = controller.request_load();
    assert!(second > first);

    poll_until(&mut controller, |c| !c.is_loading());
    assert_eq!(controller.state(), SyncState::Ready);
    assert_eq!(controller.document(), Some(&json!({"v": "second"})));
}

#[test]
fn set_mode_drops_session_and_stale_completions() {
    let store = MemoryStore::new(json!({"a": 1}));
    let mut controller = controller(&store, SyncMode::Remote);
    assert!(controller.load());
    controller.set_field(&path("a"), json!(2));
    assert!(controller.request_save().is_some());

    controller.set_mode(SyncMode::Local);
    assert_eq!(controller.mode(), SyncMode::Local);
    assert_eq!(controller.state(), SyncState::Idle);
    assert!(controller.document().is_none());
    assert!(controller.version().is_none());
    assert!(!controller.is_saving());

    thread::sleep(Duration::from_millis(20));
    controller.poll();
    assert_eq!(controller.state(), SyncState::Idle);
    assert!(controller.document().is_none());

    assert!(controller.load());
    assert_eq!(controller.mode(), SyncMode::Local);
}

#[test]
fn edits_during_inflight_save_stay_dirty() {
    let store = MemoryStore::new(json!({"a": 1}));
    let mut controller = controller(&store, SyncMode::Remote);
    assert!(controller.load());
    controller.set_field(&path("a"), json!(2));
    controller.request_save();
    controller.set_field(&path("a"), json!(3));

    poll_until(&mut controller, |c| !c.is_saving());
    assert_eq!(controller.state(), SyncState::Ready);
    assert_eq!(store.document(), json!({"a": 2}));
    assert!(controller.is_dirty());
    assert_eq!(controller.get_field(&path("a")), Some(&json!(3)));
}

#[test]
fn sync_mode_parses_case_insensitively() {
    assert_eq!("LOCAL".parse::<SyncMode>(), Ok(SyncMode::Local));
    assert_eq!(" remote ".parse::<SyncMode>(), Ok(SyncMode::Remote));
    assert!("hybrid".parse::<SyncMode>().is_err());
    assert_eq!(SyncMode::Remote.to_string(), "remote");
}

#[test]
fn listeners_survive_a_mode_switch() {
    let store = MemoryStore::new(json!({"a": 1}));
    let mut controller = SyncController::new(
        Stores::new(Arc::new(store.clone())).with_local(Arc::new(MemoryLocalFile::new(json!({})))),
        SyncMode::Remote,
    );
    let events = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    controller.subscribe(move |event| sink.lock().expect("events").push(*event));

    assert!(controller.load());
    controller.set_field(&path("a"), json!(2));
    controller.set_mode(SyncMode::Local);
    assert!(controller.load());
    controller.set_field(&path("a"), json!(3));

    let seen = events.lock().expect("events").clone();
    assert_eq!(
        seen,
        vec![SessionEvent::Edited { entries: 1 }, SessionEvent::Edited { entries: 1 }]
    );
}
