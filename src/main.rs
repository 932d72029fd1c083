#![forbid(unsafe_code)]

//! `reset-zone`: graceful reset host daemon.
//!
//! Bootstraps configuration, finishes any reset interrupted by an abrupt
//! kill, starts the game server as a child, registers the shutdown
//! finalizer, and serves reset requests over IPC until a reset, a server
//! crash or a termination signal ends the process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use reset_zone::config::GlobalConfig;
use reset_zone::host::{
    ChildServer, CommandSave, FsRemover, ProcessExiter, SaveDirectory, ServerControl,
};
use reset_zone::ipc::server::{spawn_ipc_server, IpcState};
use reset_zone::lifecycle::Lifecycle;
use reset_zone::monitor::{spawn_server_monitor, POLL_INTERVAL};
use reset_zone::reset::recovery::recover_interrupted;
use reset_zone::reset::{Journal, PendingReset, ResetCoordinator, ShutdownFinalizer};
use reset_zone::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "reset-zone", about = "Graceful reset host daemon", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the save directory from the configuration file.
    #[arg(long)]
    save_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("reset-zone bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.apply_env_overrides();

    if let Some(dir) = args.save_dir {
        config.save_dir = dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid save_dir override: {err}")))?;
    }

    let config = Arc::new(config);
    info!(save_dir = %config.save_dir.display(), "configuration loaded");

    // ── Host capabilities ───────────────────────────────
    let storage = Arc::new(SaveDirectory::new(config.save_dir.clone()));
    let remover = Arc::new(FsRemover);
    let saver = Arc::new(CommandSave::new(config.save.command.clone()));
    let journal = config
        .journal_path
        .as_ref()
        .map(|path| Arc::new(Journal::new(path.clone())));

    // ── Finish a reset interrupted by an abrupt kill ────
    if let Some(ref journal) = journal {
        if let Err(err) = recover_interrupted(journal, storage.as_ref(), remover.as_ref()) {
            error!(%err, "startup recovery failed");
        }
    }

    // ── Start the game server ───────────────────────────
    let server = Arc::new(ChildServer::spawn(&config.server)?);

    // ── Register the shutdown finalizer ─────────────────
    let pending = Arc::new(PendingReset::new());
    let lifecycle = Arc::new(Lifecycle::new(Arc::new(ProcessExiter)));

    let mut finalizer = ShutdownFinalizer::new(Arc::clone(&pending), storage, remover)
        .with_handoff_wait(config.shutdown_grace());
    if let Some(ref journal) = journal {
        finalizer = finalizer.with_journal(Arc::clone(journal));
    }
    lifecycle.register(Arc::new(finalizer));

    let mut coordinator = ResetCoordinator::new(
        Arc::clone(&pending),
        saver,
        Arc::clone(&server) as Arc<dyn ServerControl>,
        Arc::clone(&lifecycle),
        tokio::runtime::Handle::current(),
    )
    .with_save_timeout(config.save_timeout());
    if let Some(journal) = journal {
        coordinator = coordinator.with_journal(journal);
    }

    // ── Start the trigger channel ───────────────────────
    let ct = CancellationToken::new();
    let state = Arc::new(IpcState {
        config: Arc::clone(&config),
        coordinator: Arc::new(coordinator),
    });
    let ipc_handle = spawn_ipc_server(state, ct.clone())?;
    let monitor_handle = spawn_server_monitor(
        Arc::clone(&server),
        pending,
        Arc::clone(&lifecycle),
        ct.clone(),
        POLL_INTERVAL,
    );

    info!("reset-zone ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    if let Err(err) = ipc_handle.await {
        error!(%err, "ipc server task failed");
    }
    if let Err(err) = monitor_handle.await {
        error!(%err, "server monitor task failed");
    }

    // Graceful termination still runs the hooks; `main` returning exits 0.
    // An in-flight reset gets the grace period to save and stop the server
    // before the finalizer decides.
    let hooks = Arc::clone(&lifecycle);
    if let Err(err) = tokio::task::spawn_blocking(move || hooks.run_hooks()).await {
        error!(%err, "shutdown hooks failed");
    }

    // No-op when a reset already stopped it.
    match tokio::task::spawn_blocking(move || server.stop()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(%err, "failed to stop game server"),
        Err(err) => error!(%err, "server stop task failed"),
    }

    info!("reset-zone shut down");
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
