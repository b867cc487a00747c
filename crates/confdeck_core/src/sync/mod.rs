//! Load/save state machine between an [`EditSession`] and its document store.
//!
//! Store I/O runs on the backend worker. The blocking [`SyncController::load`]
//! and [`SyncController::save`] calls issue a request and wait for its
//! completion; the `request_*` variants return immediately and results are
//! picked up by [`SyncController::poll`]. Each request takes a new
//! generation number, and completions for anything but the latest pending
//! load/save are discarded.

mod backend;

pub use backend::{
    perform_load, perform_save, spawn_sync_backend, BackendHandle, LoadOutcome, SaveOutcome,
    SaveRequest, Stores, SyncCmd, SyncEvent,
};

use crate::constants::DEFAULT_MAX_HISTORY;
use crate::error::{FieldError, StoreError};
use crate::path::DocPath;
use crate::session::{EditSession, SessionEvent, SessionListener};
use crate::version::VersionToken;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Which store path the controller uses when the gateway is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// The gateway runs on this host; its config file is a usable fallback.
    #[default]
    Local,
    /// The gateway is the only store.
    Remote,
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown sync mode '{}'", other)),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
        })
    }
}

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Loading,
    Ready,
    LoadError,
    Saving,
    SaveError,
}

/// Coarse classification of a load failure for UI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorCode {
    Unreachable,
    Conflict,
    Invalid,
    Unknown,
}

impl LoadErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Conflict => "conflict",
            Self::Invalid => "invalid",
            Self::Unknown => "unknown",
        }
    }
}

impl From<&StoreError> for LoadErrorCode {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Transport(_) => Self::Unreachable,
            StoreError::Conflict => Self::Conflict,
            StoreError::Validation { .. } | StoreError::Malformed(_) => Self::Invalid,
            StoreError::Unknown(_) => Self::Unknown,
        }
    }
}

struct PendingSave {
    generation: u64,
    document: Value,
}

/// Orchestrates load/save of one configuration document.
pub struct SyncController {
    mode: SyncMode,
    backend: BackendHandle,
    session: Option<EditSession>,
    // Held here while no session is loaded.
    detached_listeners: Vec<SessionListener>,
    schema: Option<Value>,
    version: Option<VersionToken>,
    state: SyncState,
    load_error: Option<String>,
    load_error_code: Option<LoadErrorCode>,
    save_error: Option<String>,
    config_path: Option<String>,
    loaded_from_fallback: bool,
    last_saved_at: Option<DateTime<Utc>>,
    max_history: usize,
    generation: u64,
    pending_load: Option<u64>,
    pending_save: Option<PendingSave>,
    loaded_generation: Option<u64>,
}

impl fmt::Debug for SyncController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncController")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("session", &self.session)
            .field("version", &self.version)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl SyncController {
    /// Create an idle controller over `stores`.
    ///
    /// # Panics
    /// Panics if the backend worker thread cannot be spawned.
    pub fn new(stores: Stores, mode: SyncMode) -> Self {
        Self::with_history_limit(stores, mode, DEFAULT_MAX_HISTORY)
    }

    /// Create an idle controller whose sessions keep `max_history` patches.
    ///
    /// # Panics
    /// Panics if the backend worker thread cannot be spawned.
    pub fn with_history_limit(stores: Stores, mode: SyncMode, max_history: usize) -> Self {
        Self {
            mode,
            backend: spawn_sync_backend(stores),
            session: None,
            detached_listeners: Vec::new(),
            schema: None,
            version: None,
            state: SyncState::Idle,
            load_error: None,
            load_error_code: None,
            save_error: None,
            config_path: None,
            loaded_from_fallback: false,
            last_saved_at: None,
            max_history,
            generation: 0,
            pending_load: None,
            pending_save: None,
            loaded_generation: None,
        }
    }

    // --- load / save -------------------------------------------------------

    /// Load the document, blocking until the store answers.
    ///
    /// # Returns
    /// `true` when a document is loaded and the controller is ready.
    pub fn load(&mut self) -> bool {
        let generation = self.request_load();
        self.wait_for(generation)
    }

    /// Discard unsaved edits and history, then load again.
    pub fn reload(&mut self) -> bool {
        self.load()
    }

    /// Save the current document, blocking until the store answers.
    ///
    /// # Returns
    /// `false` when nothing is loaded or the store rejected the save.
    pub fn save(&mut self) -> bool {
        match self.request_save() {
            Some(generation) => self.wait_for(generation),
            None => false,
        }
    }

    /// Queue a load on the backend worker.
    ///
    /// # Returns
    /// The generation assigned to the request.
    pub fn request_load(&mut self) -> u64 {
        let generation = self.next_generation();
        self.pending_load = Some(generation);
        self.state = SyncState::Loading;
        self.load_error = None;
        self.load_error_code = None;
        let cmd = SyncCmd::Load {
            generation,
            mode: self.mode,
        };
        if self.backend.cmd_tx.send(cmd).is_err() {
            self.pending_load = None;
            self.fail_load(&StoreError::Unknown("Sync worker is not running".to_string()));
        }
        generation
    }

    /// Queue a save of the current document on the backend worker.
    ///
    /// # Returns
    /// The generation assigned to the request, or `None` when nothing is loaded.
    pub fn request_save(&mut self) -> Option<u64> {
        let session = self.session.as_ref()?;
        let document = session.document().clone();
        let request = SaveRequest {
            raw: session.to_json(),
            document: document.clone(),
            version: self.version.clone(),
            mode: self.mode,
        };
        let generation = self.next_generation();
        self.pending_save = Some(PendingSave {
            generation,
            document,
        });
        self.state = SyncState::Saving;
        self.save_error = None;
        if self
            .backend
            .cmd_tx
            .send(SyncCmd::Save {
                generation,
                request,
            })
            .is_err()
        {
            self.pending_save = None;
            self.fail_save(StoreError::Unknown("Sync worker is not running".to_string()));
        }
        Some(generation)
    }

    /// Apply every completion the worker has delivered so far.
    ///
    /// # Returns
    /// The number of events received (including discarded stale ones).
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.backend.evt_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    fn wait_for(&mut self, generation: u64) -> bool {
        loop {
            let event = match self.backend.evt_rx.recv() {
                Ok(event) => event,
                Err(_) => {
                    warn!("sync worker disconnected while waiting for a reply");
                    return false;
                }
            };
            let matches = event.generation() == generation
                && !matches!(event, SyncEvent::Schema { .. });
            let ok = self.handle_event(event);
            if matches {
                return ok;
            }
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn handle_event(&mut self, event: SyncEvent) -> bool {
        match event {
            SyncEvent::Loaded { generation, result } => {
                if self.pending_load != Some(generation) {
                    debug!("discarding stale load completion {}", generation);
                    return false;
                }
                self.pending_load = None;
                match result {
                    Ok(outcome) => {
                        self.finish_load(generation, outcome);
                        true
                    }
                    Err(err) => {
                        self.fail_load(&err);
                        false
                    }
                }
            }
            SyncEvent::Saved { generation, result } => {
                let Some(pending) = self
                    .pending_save
                    .take_if(|pending| pending.generation == generation)
                else {
                    debug!("discarding stale save completion {}", generation);
                    return false;
                };
                if self.loaded_generation.is_some_and(|loaded| loaded > generation) {
                    debug!("discarding save {} superseded by a newer load", generation);
                    return false;
                }
                match result {
                    Ok(outcome) => {
                        self.finish_save(pending.document, outcome);
                        true
                    }
                    Err(err) => {
                        self.fail_save(err);
                        false
                    }
                }
            }
            SyncEvent::Schema { generation, result } => {
                if self.loaded_generation != Some(generation) {
                    return false;
                }
                match result {
                    Ok(schema) => {
                        self.schema = Some(schema);
                        true
                    }
                    Err(err) => {
                        debug!("schema unavailable: {}", err);
                        false
                    }
                }
            }
        }
    }

    fn finish_load(&mut self, generation: u64, outcome: LoadOutcome) {
        let LoadOutcome {
            document,
            version,
            path,
            from_fallback,
        } = outcome;
        match self.session.as_mut() {
            Some(session) => session.reset(document),
            None => {
                let mut session = EditSession::new(document, self.max_history);
                session.attach_listeners(std::mem::take(&mut self.detached_listeners));
                self.session = Some(session);
            }
        }
        self.version = version;
        self.config_path = path;
        self.loaded_from_fallback = from_fallback;
        self.load_error = None;
        self.load_error_code = None;
        self.save_error = None;
        self.loaded_generation = Some(generation);
        self.state = self.settled_state();
        info!(
            "config loaded from {}{}",
            self.config_path.as_deref().unwrap_or("gateway"),
            if from_fallback { " (local fallback)" } else { "" }
        );

        if self
            .backend
            .cmd_tx
            .send(SyncCmd::FetchSchema { generation })
            .is_err()
        {
            debug!("schema fetch skipped: sync worker is not running");
        }
    }

    fn fail_load(&mut self, err: &StoreError) {
        warn!("config load failed: {}", err);
        self.load_error = Some(err.to_string());
        self.load_error_code = Some(LoadErrorCode::from(err));
        self.state = SyncState::LoadError;
    }

    fn finish_save(&mut self, saved: Value, outcome: SaveOutcome) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match outcome.adopted {
            Some(adopted) if adopted != *session.document() && *session.document() == saved => {
                session.reset(adopted);
            }
            _ => {
                // Edits made while the save was in flight keep the session dirty.
                if *session.document() == saved {
                    session.mark_clean();
                }
            }
        }
        session.set_field_errors(Vec::new());
        self.version = outcome.version;
        self.save_error = None;
        self.last_saved_at = Some(Utc::now());
        self.state = self.settled_state();
        info!(
            "config saved{}",
            if outcome.via_fallback {
                " to local file"
            } else {
                ""
            }
        );
    }

    fn fail_save(&mut self, err: StoreError) {
        warn!("config save failed: {}", err);
        self.save_error = Some(err.to_string());
        if let Some(session) = self.session.as_mut() {
            session.set_field_errors(err.issues().to_vec());
        }
        self.state = SyncState::SaveError;
    }

    fn settled_state(&self) -> SyncState {
        if self.pending_load.is_some() {
            SyncState::Loading
        } else if self.pending_save.is_some() {
            SyncState::Saving
        } else {
            SyncState::Ready
        }
    }

    // --- mode --------------------------------------------------------------

    /// Switch between local and remote operation.
    ///
    /// Drops the loaded document, history, version token and errors; any
    /// in-flight completions become stale. Call [`SyncController::load`] next.
    pub fn set_mode(&mut self, mode: SyncMode) {
        if self.mode == mode {
            return;
        }
        info!("switching sync mode {} -> {}", self.mode, mode);
        self.mode = mode;
        if let Some(mut session) = self.session.take() {
            self.detached_listeners.extend(session.take_listeners());
        }
        self.schema = None;
        self.version = None;
        self.pending_load = None;
        self.pending_save = None;
        self.loaded_generation = None;
        self.load_error = None;
        self.load_error_code = None;
        self.save_error = None;
        self.config_path = None;
        self.loaded_from_fallback = false;
        self.state = SyncState::Idle;
    }

    // --- status ------------------------------------------------------------

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    pub fn is_saving(&self) -> bool {
        self.pending_save.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.session.as_ref().is_some_and(EditSession::is_dirty)
    }

    pub fn document(&self) -> Option<&Value> {
        self.session.as_ref().map(EditSession::document)
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut EditSession> {
        self.session.as_mut()
    }

    /// Register a listener for edits to the loaded document.
    ///
    /// Listeners outlive the session they were attached to: a mode switch
    /// carries them over to the next loaded session.
    pub fn subscribe(&mut self, listener: impl FnMut(&SessionEvent) + Send + 'static) {
        match self.session.as_mut() {
            Some(session) => session.subscribe(listener),
            None => self.detached_listeners.push(Box::new(listener)),
        }
    }

    /// Schema hint fetched after the latest load, if the store provided one.
    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    pub fn version(&self) -> Option<&VersionToken> {
        self.version.as_ref()
    }

    pub fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    /// `true` when the current document came from the local file fallback.
    pub fn loaded_from_fallback(&self) -> bool {
        self.loaded_from_fallback
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn load_error_code(&self) -> Option<LoadErrorCode> {
        self.load_error_code
    }

    pub fn save_error(&self) -> Option<&str> {
        self.save_error.as_deref()
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn field_errors(&self) -> &[FieldError] {
        self.session
            .as_ref()
            .map(EditSession::field_errors)
            .unwrap_or_default()
    }

    /// Field error messages keyed by dotted path.
    pub fn errors(&self) -> BTreeMap<String, String> {
        self.session
            .as_ref()
            .map(|session| session.errors().clone())
            .unwrap_or_default()
    }

    // --- editing -----------------------------------------------------------

    pub fn get_field(&self, path: &DocPath) -> Option<&Value> {
        self.session.as_ref()?.get_field(path)
    }

    pub fn set_field(&mut self, path: &DocPath, value: Value) -> bool {
        self.session
            .as_mut()
            .is_some_and(|session| session.set_field(path, value))
    }

    pub fn delete_field(&mut self, path: &DocPath) -> bool {
        self.session
            .as_mut()
            .is_some_and(|session| session.delete_field(path))
    }

    pub fn append_to_array(&mut self, path: &DocPath, value: Value) -> bool {
        self.session
            .as_mut()
            .is_some_and(|session| session.append_to_array(path, value))
    }

    pub fn remove_from_array(&mut self, path: &DocPath, index: usize) -> bool {
        self.session
            .as_mut()
            .is_some_and(|session| session.remove_from_array(path, index))
    }

    /// Serialized document, or `None` when nothing is loaded.
    pub fn to_json(&self) -> Option<String> {
        self.session.as_ref().map(EditSession::to_json)
    }

    pub fn from_json(&mut self, text: &str) -> bool {
        self.session
            .as_mut()
            .is_some_and(|session| session.from_json(text))
    }

    pub fn undo(&mut self) -> bool {
        self.session.as_mut().is_some_and(EditSession::undo)
    }

    pub fn redo(&mut self) -> bool {
        self.session.as_mut().is_some_and(EditSession::redo)
    }

    pub fn can_undo(&self) -> bool {
        self.session.as_ref().is_some_and(EditSession::can_undo)
    }

    pub fn can_redo(&self) -> bool {
        self.session.as_ref().is_some_and(EditSession::can_redo)
    }
}

#[cfg(test)]
mod tests;
