// crates/flockmesh-cli/src/main.rs
// ============================================================================
// Module: Flockmesh CLI
// Description: Launcher for the control plane server.
// Purpose: Validate configuration and serve the HTTP API.
// Dependencies: clap, flockmesh-config, flockmesh-server, tokio
// ============================================================================

//! ## Overview
//! `flockmesh serve` builds the application state from `flockmesh.toml` plus
//! the recognized environment overrides and serves the API.
//! `flockmesh check-config` loads and validates the same configuration
//! without starting anything. `--demo-adapters` registers the bundled echo
//! adapter for every manifest connector; without it, connectors answer 501
//! until a real adapter is registered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use flockmesh_config::FlockmeshConfig;
use flockmesh_core::ConnectorAdapter;
use flockmesh_server::EchoAdapter;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Flockmesh control plane launcher.
#[derive(Debug, Parser)]
#[command(name = "flockmesh", version, about = "Flockmesh control plane")]
struct Cli {
    /// Path to `flockmesh.toml`; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Command to run.
    #[command(subcommand)]
    command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Register the bundled echo adapter for every manifest connector.
        #[arg(long)]
        demo_adapters: bool,
    },
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Launcher entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            report_failure(&message);
            ExitCode::FAILURE
        }
    }
}

/// Reports a startup failure on stderr; runtime faults surface through HTTP.
#[allow(clippy::print_stderr, reason = "Launcher error reporting.")]
fn report_failure(message: &str) {
    eprintln!("flockmesh: {message}");
}

/// Runs the selected command.
async fn run(cli: Cli) -> Result<(), String> {
    let config = FlockmeshConfig::load(cli.config.as_deref()).map_err(|err| err.to_string())?;
    match cli.command {
        Command::CheckConfig => Ok(()),
        Command::Serve { demo_adapters } => {
            let adapters = if demo_adapters {
                demo_adapter_registry(&config).map_err(|err| err.to_string())?
            } else {
                BTreeMap::new()
            };
            flockmesh_server::serve(&config, adapters).await.map_err(|err| err.to_string())
        }
    }
}

/// Builds an echo-adapter registry covering every manifest connector.
fn demo_adapter_registry(
    config: &FlockmeshConfig,
) -> Result<BTreeMap<String, Arc<dyn ConnectorAdapter>>, flockmesh_config::CatalogLoadError> {
    let attestation_keys = flockmesh_config::resolve_attestation_keys(&config.signing);
    let manifests = flockmesh_config::load_manifests(
        config.connector.manifests_path.as_deref(),
        &attestation_keys,
    )?;
    Ok(manifests
        .keys()
        .map(|connector_id| {
            (connector_id.clone(), Arc::new(EchoAdapter) as Arc<dyn ConnectorAdapter>)
        })
        .collect())
}
