//! Reference gateway exposing a config file over HTTP (state, routing, serving).

/// Embedded server helper for tests and in-process hosts.
pub mod embedded;
/// HTTP error mapping for API handlers.
pub mod error;
/// HTTP handlers for the config endpoints.
pub mod handlers;
/// Schema-subset validation of config documents.
pub mod validate;

pub use confdeck_core::{config, constants::DEFAULT_PORT, Config};
pub use embedded::EmbeddedServer;
pub use error::{HttpError, ServerError};

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use confdeck_core::store::LocalFileStore;
use hyper::HeaderMap;
use serde_json::Value;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

/// Shared state passed to HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<LocalFileStore>,
    pub schema: Option<Arc<Value>>,
}

impl AppState {
    /// Build state for `config`, reading the schema file when one is configured.
    ///
    /// # Errors
    /// Returns [`ServerError::Schema`] when the schema file cannot be read or
    /// is not JSON.
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let schema = match config.schema_path.as_deref() {
            Some(path) => Some(load_schema(path)?),
            None => None,
        };
        Ok(Self::with_schema(config, schema))
    }

    /// Build state with an already-parsed schema.
    pub fn with_schema(config: Config, schema: Option<Value>) -> Self {
        Self {
            store: Arc::new(LocalFileStore::new(&config.config_path)),
            config: Arc::new(config),
            schema: schema.map(Arc::new),
        }
    }
}

fn load_schema(path: &str) -> Result<Value, ServerError> {
    let raw = std::fs::read_to_string(path).map_err(|err| ServerError::Schema {
        path: path.to_string(),
        reason: err.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|err| ServerError::Schema {
        path: path.to_string(),
        reason: err.to_string(),
    })
}

/// Create the application router with all routes and middleware.
pub fn create_app(state: AppState, allow_public_access: bool) -> Router {
    let cors_port = state.config.port;
    create_app_with_cors_port(state, allow_public_access, cors_port)
}

/// Resolve the listener address from `config.bind` and the security policy.
///
/// `bind` may be a full socket address (`0.0.0.0:9000`) or a bare IP, in
/// which case `config.port` is used. Invalid values fall back to loopback.
///
/// # Returns
/// A socket address that is loopback unless `allow_public_access` is set.
pub fn resolve_bind_address(config: &Config, allow_public_access: bool) -> SocketAddr {
    let default_bind = SocketAddr::from(([127, 0, 0, 1], config.port));
    let raw = config.bind.trim();
    let requested = if let Ok(addr) = raw.parse::<SocketAddr>() {
        addr
    } else if let Ok(ip) = raw.parse::<IpAddr>() {
        SocketAddr::new(ip, config.port)
    } else {
        tracing::warn!(
            "Invalid BIND='{}'. Falling back to {}",
            config.bind,
            default_bind
        );
        default_bind
    };

    if allow_public_access || requested.ip().is_loopback() {
        return requested;
    }

    tracing::warn!(
        "Non-loopback bind {} requested without ALLOW_PUBLIC_ACCESS; forcing 127.0.0.1",
        requested
    );
    SocketAddr::from(([127, 0, 0, 1], requested.port()))
}

fn create_app_with_cors_port(state: AppState, allow_public_access: bool, cors_port: u16) -> Router {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    default_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    let methods = [Method::GET, Method::POST, Method::PUT];
    let cors = if allow_public_access {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = [
            format!("http://localhost:{}", cors_port),
            format!("http://127.0.0.1:{}", cors_port),
        ]
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
    };

    let mut router = Router::new()
        .route("/health", get(handlers::config::health))
        .route(
            "/api/config",
            get(handlers::config::get_config).put(handlers::config::put_config),
        )
        .route("/api/config/schema", get(handlers::config::get_schema))
        .route("/api/config/apply", post(handlers::config::apply_config))
        .route("/api/config/reload", post(handlers::config::reload_config))
        .with_state(state)
        .layer(
            tower::ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        );
    for (name, value) in default_headers.iter() {
        router = router.layer(SetResponseHeaderLayer::overriding(name.clone(), value.clone()));
    }
    router
}

fn listener_cors_port(listener: &tokio::net::TcpListener, fallback_port: u16) -> u16 {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(fallback_port)
}

/// Run the Axum server with graceful shutdown support.
///
/// # Errors
/// Returns any I/O error produced by `axum::serve`.
pub async fn serve_router(
    listener: tokio::net::TcpListener,
    state: AppState,
    allow_public_access: bool,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let cors_port = listener_cors_port(&listener, state.config.port);
    let app = create_app_with_cors_port(state, allow_public_access, cors_port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}

#[cfg(test)]
mod tests {
    use super::{listener_cors_port, resolve_bind_address, AppState, Config, ServerError};
    use confdeck_core::constants::DEFAULT_PORT;
    use std::net::SocketAddr;

    fn config_with_bind(bind: &str, port: u16) -> Config {
        Config {
            bind: bind.to_string(),
            port,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn listener_cors_port_uses_bound_listener_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener");
        let expected = listener.local_addr().expect("listener addr").port();
        assert_eq!(listener_cors_port(&listener, DEFAULT_PORT), expected);
    }

    #[test]
    fn resolve_bind_address_enforces_loopback_when_public_access_disabled() {
        let resolved = resolve_bind_address(&config_with_bind("0.0.0.0:4040", 1), false);
        assert_eq!(resolved, SocketAddr::from(([127, 0, 0, 1], 4040)));

        let public = resolve_bind_address(&config_with_bind("0.0.0.0", 4040), true);
        assert_eq!(public, SocketAddr::from(([0, 0, 0, 0], 4040)));
    }

    #[test]
    fn resolve_bind_address_falls_back_on_invalid_value() {
        let fallback = resolve_bind_address(&config_with_bind("bad:host", 4041), false);
        assert_eq!(fallback, SocketAddr::from(([127, 0, 0, 1], 4041)));
    }

    #[test]
    fn missing_schema_file_is_a_startup_error() {
        let config = Config {
            schema_path: Some("/nonexistent/confdeck/schema.json".to_string()),
            ..Config::default()
        };
        let err = AppState::new(config).err().expect("schema error");
        assert!(matches!(err, ServerError::Schema { .. }));
    }
}
