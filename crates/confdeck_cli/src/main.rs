//! Command-line editor for the gateway config.

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use confdeck_core::store::{GatewayClient, LocalFileStore};
use confdeck_core::text::{normalize_optional_nonempty, parse_value_lenient};
use confdeck_core::{Config, DocPath, EditSession, FieldError, Stores, SyncController, SyncMode};
use serde_json::Value;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "confdeck", about = "Edit the gateway config from the shell", version)]
struct Cli {
    /// Gateway URL (can also be set via CONFDECK_GATEWAY_URL)
    #[arg(short, long, env = "CONFDECK_GATEWAY_URL", global = true)]
    gateway: Option<String>,

    /// Gateway config file used as the local fallback
    #[arg(short, long, env = "CONFDECK_CONFIG_PATH", global = true)]
    config: Option<String>,

    /// Fall back to the config file when the gateway is unreachable
    #[arg(short, long, global = true)]
    local: bool,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    json: bool,

    /// Print timing for gateway round trips
    #[arg(long, global = true)]
    timing: bool,

    /// Request timeout in milliseconds
    #[arg(short = 't', long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Print the value at a dotted path (whole document when omitted)
    Get { path: Option<String> },
    /// Set a value; non-JSON input is stored as a string
    Set { path: String, value: String },
    /// Remove a key or array element
    Unset { path: String },
    /// Append a value to an array, creating it when missing
    Append { path: String, value: String },
    /// Remove the element at INDEX from an array
    Remove { path: String, index: usize },
    /// Print the whole document, or write it to FILE
    Export {
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Replace the whole document with the JSON object in FILE
    Import { file: String },
    /// Show where the config lives and whether the gateway is reachable
    Status,
}

/// A single document mutation requested on the command line.
///
/// Paths stay as typed until the document is loaded, because whether a
/// digit segment is an index depends on what it addresses.
#[derive(Debug, Clone, PartialEq)]
enum Edit {
    Set(String, Value),
    Unset(String),
    Append(String, Value),
    Remove(String, usize),
    Import(String),
}

impl Edit {
    fn label(&self) -> &'static str {
        match self {
            Edit::Set(..) => "set",
            Edit::Unset(_) => "unset",
            Edit::Append(..) => "append",
            Edit::Remove(..) => "remove",
            Edit::Import(_) => "import",
        }
    }
}

/// Resolve a dotted path against `document`; `""` and `"."` address the root.
fn resolve_path(document: &Value, raw: &str) -> DocPath {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." {
        DocPath::root()
    } else {
        DocPath::resolve_dotted(document, trimmed)
    }
}

/// Apply `edit` to `session`.
///
/// # Returns
/// `Ok(true)` when the document changed, `Ok(false)` for a no-op.
///
/// # Errors
/// Returns a message when an imported document is not a JSON object.
fn apply_edit(session: &mut EditSession, edit: &Edit) -> Result<bool, String> {
    match edit {
        Edit::Set(raw, value) => {
            let path = resolve_path(session.document(), raw);
            Ok(session.set_field(&path, value.clone()))
        }
        Edit::Unset(raw) => {
            let path = resolve_path(session.document(), raw);
            Ok(session.delete_field(&path))
        }
        Edit::Append(raw, value) => {
            let path = resolve_path(session.document(), raw);
            Ok(session.append_to_array(&path, value.clone()))
        }
        Edit::Remove(raw, index) => {
            let path = resolve_path(session.document(), raw);
            Ok(session.remove_from_array(&path, *index))
        }
        Edit::Import(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(_)) => Ok(session.from_json(text)),
            _ => Err("import file must contain a JSON object".to_string()),
        },
    }
}

fn format_value(value: &Value, json: bool) -> anyhow::Result<String> {
    match value {
        Value::String(text) if !json => Ok(text.clone()),
        Value::Object(_) | Value::Array(_) => Ok(serde_json::to_string_pretty(value)?),
        other => Ok(other.to_string()),
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| {
            let location = if error.path.is_root() {
                "(root)".to_string()
            } else {
                error.path.to_dotted()
            };
            format!("  {}: {}", location, error.message)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn log_timing(timing: bool, label: &str, duration: Duration) {
    if timing {
        eprintln!(
            "[timing] {}: {:.1} ms",
            label,
            duration.as_secs_f64() * 1000.0
        );
    }
}

fn normalize_gateway(gateway: String) -> String {
    if let Ok(mut url) = reqwest::Url::parse(&gateway) {
        let should_normalize_localhost =
            url.scheme().eq_ignore_ascii_case("http") && url.host_str() == Some("localhost");
        if should_normalize_localhost && url.set_host(Some("127.0.0.1")).is_err() {
            return gateway;
        }
        let mut normalized = url.to_string();
        while normalized.ends_with('/') {
            normalized.pop();
        }
        return normalized;
    }
    gateway
}

/// Merge command-line overrides into the environment configuration.
fn resolve_config(cli: &Cli, mut config: Config) -> Config {
    if let Some(gateway) = normalize_optional_nonempty(cli.gateway.clone()) {
        config.gateway_url = gateway;
    }
    config.gateway_url = normalize_gateway(config.gateway_url);
    if let Some(path) = normalize_optional_nonempty(cli.config.clone()) {
        config.config_path = confdeck_core::config::expand_tilde(path);
    }
    if cli.local {
        config.mode = SyncMode::Local;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.request_timeout_ms = timeout_ms;
    }
    config
}

fn edit_for_command(command: &Commands) -> anyhow::Result<Option<Edit>> {
    Ok(match command {
        Commands::Set { path, value } => Some(Edit::Set(path.clone(), parse_value_lenient(value))),
        Commands::Unset { path } => Some(Edit::Unset(path.clone())),
        Commands::Append { path, value } => {
            Some(Edit::Append(path.clone(), parse_value_lenient(value)))
        }
        Commands::Remove { path, index } => Some(Edit::Remove(path.clone(), *index)),
        Commands::Import { file } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file))?;
            Some(Edit::Import(text))
        }
        _ => None,
    })
}

fn build_controller(config: &Config) -> anyhow::Result<(SyncController, Arc<GatewayClient>)> {
    let gateway = Arc::new(GatewayClient::new(
        &config.gateway_url,
        config.request_timeout(),
    )?);
    let mut stores = Stores::new(gateway.clone());
    if config.mode == SyncMode::Local {
        stores = stores.with_local(Arc::new(LocalFileStore::new(&config.config_path)));
    }
    let controller = SyncController::with_history_limit(stores, config.mode, config.max_history);
    Ok((controller, gateway))
}

fn load_or_bail(controller: &mut SyncController, timing: bool) -> anyhow::Result<()> {
    let started = Instant::now();
    let loaded = controller.load();
    log_timing(timing, "load", started.elapsed());
    if !loaded {
        let code = controller
            .load_error_code()
            .map(|code| code.as_str())
            .unwrap_or("unknown");
        bail!(
            "Load failed ({}): {}",
            code,
            controller.load_error().unwrap_or("no details")
        );
    }
    if controller.loaded_from_fallback() {
        eprintln!(
            "gateway unreachable; using {}",
            controller.config_path().unwrap_or("local config file")
        );
    }
    Ok(())
}

fn print_status(
    controller: &SyncController,
    config: &Config,
    gateway: &GatewayClient,
    json: bool,
) -> anyhow::Result<()> {
    let reachable = gateway.health().is_ok();
    let status = serde_json::json!({
        "gateway": config.gateway_url,
        "reachable": reachable,
        "mode": controller.mode().to_string(),
        "path": controller.config_path(),
        "version": controller.version().map(|version| version.as_str()),
        "fallback": controller.loaded_from_fallback(),
    });
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!(
            "gateway:  {} ({})",
            config.gateway_url,
            if reachable { "reachable" } else { "unreachable" }
        );
        println!("mode:     {}", controller.mode());
        println!("config:   {}", controller.config_path().unwrap_or("-"));
        println!(
            "version:  {}",
            controller.version().map(|version| version.as_str()).unwrap_or("-")
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let config = resolve_config(&cli, Config::from_env());
    let edit = edit_for_command(&cli.command)?;
    let (mut controller, gateway) = build_controller(&config)?;

    if matches!(cli.command, Commands::Status) {
        // Status is informative even when nothing can be loaded.
        let _ = controller.load();
        return print_status(&controller, &config, &gateway, cli.json);
    }

    load_or_bail(&mut controller, cli.timing)?;

    match (&cli.command, edit) {
        (_, Some(edit)) => {
            let Some(session) = controller.session_mut() else {
                bail!("no document loaded");
            };
            let changed = apply_edit(session, &edit).map_err(anyhow::Error::msg)?;
            if !changed {
                eprintln!("{}: no change", edit.label());
                return Ok(());
            }
            let started = Instant::now();
            let saved = controller.save();
            log_timing(cli.timing, "save", started.elapsed());
            if !saved {
                let mut message = format!(
                    "Save failed: {}",
                    controller.save_error().unwrap_or("no details")
                );
                let errors = controller.field_errors();
                if !errors.is_empty() {
                    message.push('\n');
                    message.push_str(&format_field_errors(errors));
                }
                bail!(message);
            }
            eprintln!("{}: saved", edit.label());
        }
        (Commands::Get { path }, None) => {
            let Some(document) = controller.document() else {
                bail!("no document loaded");
            };
            let path = resolve_path(document, path.as_deref().unwrap_or_default());
            let Some(value) = controller.get_field(&path) else {
                bail!("{} is not set", path);
            };
            println!("{}", format_value(value, cli.json)?);
        }
        (Commands::Export { output }, None) => {
            let text = controller.to_json().unwrap_or_else(|| "{}".to_string());
            match output {
                Some(file) => {
                    std::fs::write(file, format!("{}\n", text))
                        .with_context(|| format!("failed to write {}", file))?;
                    eprintln!("exported to {}", file);
                }
                None => println!("{}", text),
            }
        }
        _ => {}
    }
    Ok(())
}
