//! Shared integration-test gateway bootstrap helpers.

use axum_test::TestServer;
use confdeck_server::{create_app, AppState, Config};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

pub(crate) fn test_config_for_path(config_path: &Path) -> Config {
    Config {
        config_path: config_path.to_str().expect("config path").to_string(),
        port: 0,
        ..Config::default()
    }
}

/// Gateway over a temp config file seeded with `initial`.
pub(crate) fn setup_test_server(
    initial: Option<&Value>,
    schema: Option<Value>,
) -> (TestServer, AppState, TempDir) {
    let temp_dir = TempDir::new().expect("temp dir");
    let config_path = temp_dir.path().join("gateway.json");
    if let Some(initial) = initial {
        let raw = serde_json::to_string_pretty(initial).expect("encode seed");
        std::fs::write(&config_path, raw).expect("seed config");
    }
    let state = AppState::with_schema(test_config_for_path(&config_path), schema);
    let server = TestServer::new(create_app(state.clone(), false)).expect("server");
    (server, state, temp_dir)
}
