// src/main.rs

//! The main entry point for the hbwarden heartbeat service.

use anyhow::Result;
use hbwarden::config::HeartbeatConfig;
use hbwarden::server;
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("hbwarden version {VERSION}");
        return Ok(());
    }

    if args.len() != 2 {
        eprintln!("Usage: hbwarden /path/to/heartbeat.toml");
        std::process::exit(1);
    }
    let config_path = &args[1];

    // Load before logging is up so that the log level can come from the file.
    let config = match HeartbeatConfig::from_file(config_path).await {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true), // Enable ANSI color codes for log levels.
        )
        .init();

    let reload_handle = Arc::new(reload_handle);

    if let Err(e) = server::run(config, config_path, reload_handle).await {
        error!("hbwarden runtime error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
