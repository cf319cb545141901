//! `autocheck` binary: HTTP server and one-shot evaluation.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use autocheck_core::Role;
use autocheck_runtime::{Caller, ProviderRegistry, StaticTokenIdentity};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod app;
mod server;

#[derive(Parser)]
#[command(
    name = "autocheck",
    version,
    about = "Evaluate business processes for compliance, business value and tooling"
)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "AUTOCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        listen: SocketAddr,
    },

    /// Evaluate one request file and print the result
    Evaluate {
        /// Request JSON file, or `-` for stdin
        #[arg(short, long)]
        input: PathBuf,

        /// User id charged against the quota
        #[arg(short, long)]
        user: String,

        /// Profile role (`admin` is quota-exempt)
        #[arg(short, long)]
        role: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = app::load_config(cli.config.as_deref())?;
    let registry = ProviderRegistry::with_defaults();
    let service = app::build_service(&config, &registry).await?;

    match cli.command {
        Command::Serve { listen } => {
            let identity = StaticTokenIdentity::from_config(&config.identity);
            if identity.is_empty() {
                tracing::warn!("No identity tokens configured; every request will be rejected");
            }

            let state = server::AppState::new(service, Arc::new(identity));
            let listener = tokio::net::TcpListener::bind(listen)
                .await
                .with_context(|| format!("Failed to bind {}", listen))?;
            tracing::info!(address = %listen, "Listening");

            axum::serve(listener, server::router(state))
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;
        }
        Command::Evaluate { input, user, role } => {
            let body = read_input(&input).await?;
            let caller = Caller::new(user, Role::from_profile(role.as_deref()));

            match service
                .evaluate(Some(&caller), &body, chrono::Utc::now())
                .await
            {
                Ok(outputs) => println!("{}", serde_json::to_string_pretty(&outputs)?),
                Err(e) => {
                    if let Some(details) = e.details() {
                        for issue in details {
                            eprintln!("  {}: {}", issue.field, issue.message);
                        }
                    }
                    anyhow::bail!("{} ({})", e, e.status_code());
                }
            }
        }
    }

    Ok(())
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        use tokio::io::AsyncReadExt;
        let mut body = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut body)
            .await
            .context("Failed to read stdin")?;
        return Ok(body);
    }
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
