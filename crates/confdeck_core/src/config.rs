//! Configuration loading from environment variables.

use crate::constants::{
    CONFIG_DIR_NAME, DEFAULT_CONFIG_FILE_NAME, DEFAULT_GATEWAY_URL, DEFAULT_MAX_HISTORY,
    DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_MS,
};
use crate::sync::SyncMode;
use crate::text::normalize_optional_nonempty;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Runtime configuration shared by the gateway, the CLI and embedders.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the gateway config API.
    pub gateway_url: String,
    /// Gateway config file; also the local fallback target.
    pub config_path: String,
    /// Optional JSON schema served by the gateway.
    pub schema_path: Option<String>,
    pub mode: SyncMode,
    pub max_history: usize,
    pub request_timeout_ms: u64,
    /// Gateway listen port.
    pub port: u16,
    /// Gateway bind address.
    pub bind: String,
}

/// Expand tilde (~) in paths to the user's home directory
pub fn expand_tilde(path: String) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = resolve_home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path
}

fn resolve_home_dir() -> Option<PathBuf> {
    if let Ok(home) = env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }

    // Windows
    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.trim().is_empty() {
            return Some(PathBuf::from(profile));
        }
    }
    if let (Ok(drive), Ok(path)) = (env::var("HOMEDRIVE"), env::var("HOMEPATH")) {
        if !drive.trim().is_empty() && !path.trim().is_empty() {
            return Some(PathBuf::from(format!("{}{}", drive, path)));
        }
    }

    env::current_dir().ok()
}

/// Default gateway config location: `~/.confdeck/gateway.json`.
pub fn default_config_path() -> String {
    let home = resolve_home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(CONFIG_DIR_NAME)
        .join(DEFAULT_CONFIG_FILE_NAME)
        .to_string_lossy()
        .to_string()
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean flag from the environment.
///
/// Missing or unrecognized values are treated as `false`.
pub fn env_flag_enabled(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_env_flag(&value))
        .unwrap_or(false)
}

fn env_nonempty(name: &str) -> Option<String> {
    normalize_optional_nonempty(env::var(name).ok())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env_nonempty(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {}='{}'", name, raw);
            default
        }),
        None => default,
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`Config`] with defaults applied when env vars are missing
    /// or unparsable.
    pub fn from_env() -> Self {
        let mode = match env_nonempty("CONFDECK_MODE") {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!("{}; defaulting to local mode", err);
                SyncMode::Local
            }),
            None => SyncMode::Local,
        };
        Self {
            gateway_url: env_nonempty("CONFDECK_GATEWAY_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            config_path: env_nonempty("CONFDECK_CONFIG_PATH")
                .map(expand_tilde)
                .unwrap_or_else(default_config_path),
            schema_path: env_nonempty("CONFDECK_SCHEMA_PATH").map(expand_tilde),
            mode,
            max_history: env_parsed("CONFDECK_MAX_HISTORY", DEFAULT_MAX_HISTORY).max(1),
            request_timeout_ms: env_parsed("CONFDECK_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS),
            port: env_parsed("PORT", DEFAULT_PORT),
            bind: env_nonempty("BIND").unwrap_or_else(|| "127.0.0.1".to_string()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            config_path: default_config_path(),
            schema_path: None,
            mode: SyncMode::Local,
            max_history: DEFAULT_MAX_HISTORY,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            port: DEFAULT_PORT,
            bind: "127.0.0.1".to_string(),
        }
    }
}
