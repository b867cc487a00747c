//! Config document HTTP handlers.

use crate::{error::HttpError, validate::validate_document, AppState};
use axum::{extract::State, Json};
use confdeck_core::error::FieldError;
use confdeck_core::path::DocPath;
use confdeck_core::store::wire::{
    ApplyRequest, ApplyResponse, ConfigResponse, HashResponse, SetAllRequest,
};
use confdeck_core::store::DocumentStore;
use confdeck_core::version::VersionToken;
use serde_json::{json, Value};
use tracing::info;

/// Reject documents that are not objects or violate the configured schema.
fn check_document(state: &AppState, document: &Value) -> Result<(), HttpError> {
    if !document.is_object() {
        return Err(HttpError::invalid(
            "Config root must be an object",
            vec![FieldError::new(DocPath::root(), "expected an object")],
        ));
    }
    if let Some(schema) = state.schema.as_deref() {
        let issues = validate_document(schema, document);
        if !issues.is_empty() {
            return Err(HttpError::invalid("Config failed schema validation", issues));
        }
    }
    Ok(())
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn get_config(State(state): State<AppState>) -> Result<Json<ConfigResponse>, HttpError> {
    let snapshot = state.store.get()?;
    Ok(Json(ConfigResponse {
        config: snapshot.document,
        hash: snapshot.version.map(|version| version.as_str().to_string()),
        path: snapshot.path,
    }))
}

pub async fn get_schema(State(state): State<AppState>) -> Result<Json<Value>, HttpError> {
    state
        .schema
        .as_deref()
        .cloned()
        .map(Json)
        .ok_or_else(|| HttpError::NotFound("Schema".to_string()))
}

/// Compare-and-swap replace of the whole document.
pub async fn apply_config(
    State(state): State<AppState>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<ApplyResponse>, HttpError> {
    let document: Value = serde_json::from_str(&request.raw).map_err(|err| {
        HttpError::invalid(
            "Config is not valid JSON",
            vec![FieldError::new(DocPath::root(), err.to_string())],
        )
    })?;
    check_document(&state, &document)?;

    let outcome = state
        .store
        .apply(&request.raw, &VersionToken::new(request.base_hash))?;
    info!("config applied ({} bytes)", request.raw.len());
    Ok(Json(ApplyResponse {
        config: outcome.document,
        hash: outcome.version.map(|version| version.as_str().to_string()),
    }))
}

/// Unconditional replace of the whole document.
pub async fn put_config(
    State(state): State<AppState>,
    Json(request): Json<SetAllRequest>,
) -> Result<Json<HashResponse>, HttpError> {
    check_document(&state, &request.config)?;
    state.store.set_all(&request.config)?;
    info!("config replaced without version check");
    current_hash(&state)
}

/// Re-read the config file and report its hash.
pub async fn reload_config(State(state): State<AppState>) -> Result<Json<HashResponse>, HttpError> {
    state.store.reload()?;
    let response = current_hash(&state)?;
    info!("config reloaded from {}", state.store.path().display());
    Ok(response)
}

fn current_hash(state: &AppState) -> Result<Json<HashResponse>, HttpError> {
    let snapshot = state.store.get()?;
    Ok(Json(HashResponse {
        hash: snapshot.version.map(|version| version.as_str().to_string()),
    }))
}
