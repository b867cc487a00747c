//! Background worker performing document store I/O for the sync controller.
//!
//! The controller sends [`SyncCmd`] values and polls [`SyncEvent`] replies.
//! Every command carries the generation it was issued under so the
//! controller can drop completions that a newer request has superseded.

use super::SyncMode;
use crate::error::StoreError;
use crate::store::{DocumentStore, LocalDocumentStore};
use crate::version::VersionToken;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Primary store plus the optional local-file fallback.
#[derive(Clone)]
pub struct Stores {
    pub primary: Arc<dyn DocumentStore>,
    pub local: Option<Arc<dyn LocalDocumentStore>>,
}

impl Stores {
    pub fn new(primary: Arc<dyn DocumentStore>) -> Self {
        Self {
            primary,
            local: None,
        }
    }

    pub fn with_local(mut self, local: Arc<dyn LocalDocumentStore>) -> Self {
        self.local = Some(local);
        self
    }
}

/// Document and metadata produced by a successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub document: Value,
    pub version: Option<VersionToken>,
    pub path: Option<String>,
    /// `true` when the primary store was unreachable and the local file was read.
    pub from_fallback: bool,
}

/// Everything the worker needs to persist one save.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub document: Value,
    pub raw: String,
    pub version: Option<VersionToken>,
    pub mode: SyncMode,
}

/// Result of a successful save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOutcome {
    /// Document returned by the store, possibly normalized.
    pub adopted: Option<Value>,
    pub version: Option<VersionToken>,
    pub via_fallback: bool,
}

/// Commands executed by the worker thread.
#[derive(Debug)]
pub enum SyncCmd {
    Load { generation: u64, mode: SyncMode },
    Save { generation: u64, request: SaveRequest },
    FetchSchema { generation: u64 },
}

/// Completions sent back to the controller.
#[derive(Debug)]
pub enum SyncEvent {
    Loaded {
        generation: u64,
        result: Result<LoadOutcome, StoreError>,
    },
    Saved {
        generation: u64,
        result: Result<SaveOutcome, StoreError>,
    },
    Schema {
        generation: u64,
        result: Result<Value, StoreError>,
    },
}

impl SyncEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Loaded { generation, .. }
            | Self::Saved { generation, .. }
            | Self::Schema { generation, .. } => *generation,
        }
    }
}

/// Handle for sending commands to, and receiving events from, the worker.
pub struct BackendHandle {
    pub cmd_tx: Sender<SyncCmd>,
    pub evt_rx: Receiver<SyncEvent>,
}

/// Spawn the worker thread; it exits once the command sender is dropped.
///
/// # Panics
/// Panics if the worker thread cannot be spawned.
pub fn spawn_sync_backend(stores: Stores) -> BackendHandle {
    let (cmd_tx, cmd_rx) = unbounded::<SyncCmd>();
    let (evt_tx, evt_rx) = unbounded();

    thread::Builder::new()
        .name("confdeck-sync-backend".to_string())
        .spawn(move || {
            for cmd in cmd_rx.iter() {
                let event = match cmd {
                    SyncCmd::Load { generation, mode } => SyncEvent::Loaded {
                        generation,
                        result: perform_load(&stores, mode),
                    },
                    SyncCmd::Save {
                        generation,
                        request,
                    } => SyncEvent::Saved {
                        generation,
                        result: perform_save(&stores, &request),
                    },
                    SyncCmd::FetchSchema { generation } => SyncEvent::Schema {
                        generation,
                        result: stores.primary.schema(),
                    },
                };
                if evt_tx.send(event).is_err() {
                    break;
                }
            }
            debug!("sync backend stopped");
        })
        .expect("spawn sync backend thread");

    BackendHandle { cmd_tx, evt_rx }
}

/// Read the document from the primary store, falling back to the local file
/// when the store is unreachable in local mode.
pub fn perform_load(stores: &Stores, mode: SyncMode) -> Result<LoadOutcome, StoreError> {
    let outcome = match stores.primary.get() {
        Ok(snapshot) => LoadOutcome {
            document: snapshot.document,
            version: snapshot.version,
            path: snapshot.path,
            from_fallback: false,
        },
        Err(err) if err.is_transport() && mode == SyncMode::Local => {
            let Some(local) = stores.local.as_ref() else {
                return Err(err);
            };
            warn!("gateway unreachable ({}); reading local config file", err);
            let snapshot = local.get()?;
            LoadOutcome {
                document: snapshot.document,
                version: None,
                path: Some(snapshot.path),
                from_fallback: true,
            }
        }
        Err(err) => return Err(err),
    };
    if !outcome.document.is_object() {
        return Err(StoreError::Malformed(
            "config root must be an object".to_string(),
        ));
    }
    Ok(outcome)
}

/// Persist a document, using compare-and-swap when a version token is held.
pub fn perform_save(stores: &Stores, request: &SaveRequest) -> Result<SaveOutcome, StoreError> {
    if let Some(version) = request.version.as_ref() {
        let applied = stores.primary.apply(&request.raw, version)?;
        info!("config applied with version check");
        // Keep the token of the state this apply wrote, not whatever is current.
        let version = match applied.version {
            Some(version) => Some(version),
            None => refresh_version(stores.primary.as_ref()),
        };
        return Ok(SaveOutcome {
            adopted: applied.document.filter(Value::is_object),
            version,
            via_fallback: false,
        });
    }

    let bulk = stores
        .primary
        .set_all(&request.document)
        .and_then(|()| stores.primary.reload());
    match bulk {
        Ok(()) => {
            info!("config written without version check");
            Ok(SaveOutcome {
                adopted: None,
                version: refresh_version(stores.primary.as_ref()),
                via_fallback: false,
            })
        }
        Err(err) if err.is_transport() && request.mode == SyncMode::Local => {
            let Some(local) = stores.local.as_ref() else {
                return Err(err);
            };
            warn!("gateway unreachable ({}); writing local config file", err);
            local.update(&request.document)?;
            if let Err(reload_err) = stores.primary.reload() {
                warn!("gateway reload after local write failed: {}", reload_err);
            }
            Ok(SaveOutcome {
                adopted: None,
                version: None,
                via_fallback: true,
            })
        }
        Err(err) => Err(err),
    }
}

fn refresh_version(store: &dyn DocumentStore) -> Option<VersionToken> {
    match store.get() {
        Ok(snapshot) => snapshot.version,
        Err(err) => {
            warn!("failed to refresh config version after save: {}", err);
            None
        }
    }
}
