//! Checker Daemon
//!
//! Standalone HTTP server for the symptom checker.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (0.0.0.0:7810, ./database.sqlite)
//! GOOGLE_API_KEY=... checker-daemon
//!
//! # Custom port and an in-memory database
//! checker-daemon --port 8080 --database :memory:
//!
//! # Only try specific models, in this order
//! checker-daemon --model gemini-1.5-flash --model gemini-1.5-pro
//!
//! # With verbose logging
//! RUST_LOG=debug checker-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `GOOGLE_API_KEY`: Gemini API key (analysis is disabled without it)
//! - `PORT` / `HOST`: Listen address
//! - `DB_PATH`: Database file, or `:memory:`
//! - `NODE_ENV`: `production` forces an in-memory database
//! - `CHECKER_MODELS`: Comma-separated candidate models
//! - `CHECKER_CALL_TIMEOUT_SECS`: Per-candidate timeout
//! - `CHECKER_MAX_INPUT_LENGTH`: Longest accepted description
//! - `CHECKER_PERSISTENCE`: `strict` or `best_effort`
//! - `CHECKER_CONFIG`: Config file path
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use checker_core::{
    load_config, load_config_from_path, ConfigOverrides, ModelInvoker, QueryPipeline,
    SqliteQueryStore,
};
use checker_daemon::{serve, shutdown_signal, AppState};

/// Healthcare symptom checker HTTP daemon
#[derive(Debug, Parser)]
#[command(name = "checker-daemon", version, about)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/symptom-checker/checker.toml)
    #[arg(long, env = "CHECKER_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,

    /// Database file, or `:memory:`
    #[arg(long)]
    database: Option<String>,

    /// Candidate model; repeat to build an ordered list
    #[arg(long = "model", value_name = "MODEL")]
    models: Vec<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref host) = self.host {
            overrides = overrides.with_host(host.clone());
        }
        if let Some(port) = self.port {
            overrides = overrides.with_port(port);
        }
        if let Some(ref database) = self.database {
            overrides = overrides.with_database_path(database.clone());
        }
        if !self.models.is_empty() {
            overrides = overrides.with_models(self.models.clone());
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("checker_daemon=info".parse()?)
                .add_directive("checker_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    info!("Starting Healthcare Symptom Checker");

    let mut config = match args.config {
        Some(ref path) => {
            if !path.exists() {
                bail!("Config file {} does not exist", path.display());
            }
            load_config_from_path(Some(path.clone()))
        }
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        models = ?config.backend.models,
        database = %config.storage.database_path,
        persistence = %config.pipeline.persistence,
        "Configuration loaded"
    );

    let invoker = ModelInvoker::from_config(&config.backend).context("Invalid model list")?;

    let store = SqliteQueryStore::open(config.storage.location())
        .await
        .with_context(|| format!("Failed to open database {}", config.storage.database_path))?;

    let pipeline = QueryPipeline::new(invoker, Arc::new(store))
        .with_limits(config.limits)
        .with_persistence(config.pipeline.persistence);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    serve(listener, AppState::new(pipeline), shutdown_signal()).await
}
