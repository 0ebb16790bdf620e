#![forbid(unsafe_code)]

//! `connect-four-relay`: HTTP relay server binary.
//!
//! Bootstraps configuration, the session registry and its reaper, and the
//! HTTP facade, then runs until Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use connect_four_relay::config::GlobalConfig;
use connect_four_relay::errors::report_join;
use connect_four_relay::http::{self, AppState};
use connect_four_relay::session::reaper::spawn_reaper;
use connect_four_relay::session::{RegistryOptions, SessionRegistry};
use connect_four_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "connect-four-relay", about = "Connect Four engine relay server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP port from the configuration.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("connect-four-relay bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };

    if let Some(port) = args.port {
        config.http.port = port;
    }

    let config = Arc::new(config);
    info!(
        engine = %config.engine.binary.display(),
        checkpoint = config.engine.az_checkpoint,
        move_wait_seconds = config.timeouts.move_wait_seconds,
        "configuration loaded"
    );

    // ── Session registry and reaper ─────────────────────
    let registry = SessionRegistry::new(RegistryOptions::from_config(&config))?;
    let ct = CancellationToken::new();
    let reaper_handle = spawn_reaper(registry.clone(), config.reap_interval(), ct.clone());
    info!("session reaper started");

    // ── HTTP facade ─────────────────────────────────────
    let listener = http::bind(&config.http).await?;
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        registry: registry.clone(),
    });

    let http_ct = ct.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(listener, state, http_ct).await {
            error!(%err, "http facade failed");
        }
    });

    info!("relay ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let (http_result, reaper_result) = tokio::join!(http_handle, reaper_handle);
    report_join("http facade", &http_result);
    report_join("session reaper", &reaper_result);

    let drained = registry.shutdown().await;
    info!(sessions = drained, "connect-four-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
