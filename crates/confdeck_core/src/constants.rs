//! Shared constants used across confdeck crates.

/// Default listen port for the reference gateway.
pub const DEFAULT_PORT: u16 = 18789;

/// Default base URL for gateway clients.
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:18789";

/// Default number of patches kept per editing session.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Default per-request timeout for gateway calls.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Directory under the home directory holding the gateway config.
pub const CONFIG_DIR_NAME: &str = ".confdeck";
/// File name of the gateway config inside [`CONFIG_DIR_NAME`].
pub const DEFAULT_CONFIG_FILE_NAME: &str = "gateway.json";
