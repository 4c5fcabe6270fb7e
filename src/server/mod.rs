// src/server/mod.rs

//! Process-level orchestration: builds the heartbeat checker from the configuration
//! file, spawns the background tasks and reacts to signals.

use crate::config::HeartbeatConfig;
use crate::core::heartbeat::checker::HeartbeatChecker;
use crate::core::heartbeat::opinion::{WorkflowExecutor, run_opinion_log};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, reload};

pub mod metrics_server;

pub type LogReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// How long background tasks get to finish after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runs the heartbeat service until SIGINT or SIGTERM. SIGHUP reloads the
/// configuration from `config_path`.
pub async fn run(
    config: HeartbeatConfig,
    config_path: &str,
    log_reload_handle: Arc<LogReloadHandle>,
) -> Result<()> {
    info!(
        "hbwarden starting with {} cluster(s), interval {:?}, timeout {:?}.",
        config.clusters.len(),
        config.interval,
        config.timeout
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (executor, opinion_rx) = WorkflowExecutor::new();
    let checker = HeartbeatChecker::new(
        config.handler_settings()?,
        Arc::new(executor),
        config.tick,
    );
    checker
        .apply(&config)
        .context("Failed to register heartbeat targets")?;
    info!("Tracking {} heartbeat target(s).", checker.len());

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    let selector = checker.selector();
    let selector_shutdown = shutdown_tx.subscribe();
    tasks.spawn(async move {
        selector.run(selector_shutdown).await;
        Ok(())
    });

    let opinion_shutdown = shutdown_tx.subscribe();
    tasks.spawn(async move {
        run_opinion_log(opinion_rx, opinion_shutdown).await;
        Ok(())
    });

    if config.metrics.enabled {
        tasks.spawn(metrics_server::run_metrics_server(
            config.metrics.port,
            shutdown_tx.subscribe(),
        ));
    }

    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to register SIGHUP handler")?;

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            _ = sighup.recv() => {
                info!("SIGHUP received, reloading configuration from '{}'.", config_path);
                reload(&checker, config_path, &log_reload_handle).await;
            }
            Some(res) = tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            }
        }
    }

    checker.stop_all();
    let _ = shutdown_tx.send(());
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("Background tasks did not stop within {:?}.", SHUTDOWN_GRACE);
    }
    info!("hbwarden stopped.");
    Ok(())
}

/// Re-reads the configuration file and applies it. A broken file leaves the running
/// configuration untouched.
async fn reload(
    checker: &HeartbeatChecker,
    config_path: &str,
    log_reload_handle: &LogReloadHandle,
) {
    let config = match HeartbeatConfig::from_file(config_path).await {
        Ok(config) => config,
        Err(e) => {
            warn!("Configuration reload failed, keeping the current one: {:#}", e);
            return;
        }
    };

    if std::env::var("RUST_LOG").is_err() {
        match EnvFilter::try_new(&config.log_level) {
            Ok(filter) => {
                if let Err(e) = log_reload_handle.reload(filter) {
                    warn!("Failed to reload log level: {e}");
                }
            }
            Err(e) => warn!("Invalid log level '{}': {e}", config.log_level),
        }
    }

    match checker.apply(&config) {
        Ok(()) => info!(
            "Configuration reloaded; tracking {} heartbeat target(s).",
            checker.len()
        ),
        Err(e) => error!("Failed to apply reloaded configuration: {}", e),
    }
}
