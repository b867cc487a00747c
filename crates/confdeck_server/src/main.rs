//! Reference gateway entrypoint.

use confdeck_core::config::env_flag_enabled;
use confdeck_core::store::DocumentStore;
use confdeck_server::validate::validate_document;
use confdeck_server::{resolve_bind_address, serve_router, AppState, Config, DEFAULT_PORT};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CliFlags {
    help: bool,
    check: bool,
}

fn parse_cli_flags(args: &[String]) -> anyhow::Result<CliFlags> {
    let mut flags = CliFlags::default();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => flags.help = true,
            "--check" => flags.check = true,
            value if value.starts_with('-') => {
                anyhow::bail!(
                    "Unknown option: '{}'. Use --help to see supported options.",
                    value
                );
            }
            value => {
                anyhow::bail!(
                    "Unexpected positional argument: '{}'. Use --help to see supported options.",
                    value
                );
            }
        }
    }
    Ok(flags)
}

/// Validate the config file against the schema and report every issue.
fn run_check(state: &AppState) -> anyhow::Result<()> {
    let snapshot = state.store.get()?;
    let Some(schema) = state.schema.as_deref() else {
        println!("{} parses as a JSON object (no schema configured)", state.store.path().display());
        return Ok(());
    };
    let issues = validate_document(schema, &snapshot.document);
    if issues.is_empty() {
        println!("{} is valid", state.store.path().display());
        return Ok(());
    }
    for issue in &issues {
        println!("  {}: {}", issue.path, issue.message);
    }
    anyhow::bail!("{} issue(s) found in {}", issues.len(), state.store.path().display())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confdeck=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli_flags = parse_cli_flags(&args)?;
    if cli_flags.help {
        print_help();
        return Ok(());
    }

    let config = Config::from_env();
    let state = AppState::new(config.clone())?;

    if cli_flags.check {
        return run_check(&state);
    }

    let allow_public = env_flag_enabled("ALLOW_PUBLIC_ACCESS");
    if allow_public {
        tracing::warn!("Public access enabled - gateway will accept requests from any origin");
    }

    let bind_addr = resolve_bind_address(&config, allow_public);
    if !bind_addr.ip().is_loopback() {
        tracing::warn!(
            "Binding to non-localhost address: {} - anyone who can reach it can rewrite the config",
            bind_addr
        );
    }

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let actual_addr = listener.local_addr().unwrap_or(bind_addr);
    tracing::info!(
        "confdeck gateway serving {} at http://{}",
        config.config_path,
        actual_addr
    );

    serve_router(listener, state, allow_public, shutdown_signal()).await?;
    tracing::info!("gateway stopped");
    Ok(())
}

fn print_help() {
    println!("confdeck gateway\n");
    println!("Usage: confdeck-gateway [OPTIONS]\n");
    println!("Options:");
    println!("  --check           Validate the config file against the schema and exit");
    println!("  --help            Show this help message");
    println!("\nEnvironment variables:");
    println!("  CONFDECK_CONFIG_PATH  Config file (default: ~/.confdeck/gateway.json)");
    println!("  CONFDECK_SCHEMA_PATH  JSON schema served and enforced by the gateway");
    println!("  PORT                  Listen port (default: {})", DEFAULT_PORT);
    println!("  BIND                  Bind address, IP or IP:PORT (default: 127.0.0.1)");
    println!("  ALLOW_PUBLIC_ACCESS   Allow non-loopback binds and CORS from any origin");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
