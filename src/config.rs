// src/config.rs

//! Manages heartbeat service configuration: loading, defaults and validation.

use crate::core::errors::HeartbeatError;
use crate::core::heartbeat::codec::Charset;
use crate::core::heartbeat::handler::HandlerSettings;
use crate::core::heartbeat::types::{ClusterMode, MonitorFlag, TargetKind};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::fs;

/// The top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Character set used to encode pings and decode replies.
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Per-session read buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,

    #[serde(with = "humantime_serde", default = "default_slowlog")]
    pub slowlog: Duration,

    /// How often the selector looks for sessions that are due.
    #[serde(with = "humantime_serde", default = "default_tick")]
    pub tick: Duration,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub clusters: Vec<ClusterEntry>,
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterEntry {
    pub name: String,
    pub mode: ClusterMode,
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetEntry {
    pub kind: TargetKind,
    pub id: String,
    pub ip: String,
    pub port: u16,
    /// Absent means unset: the target is tracked but not probed.
    #[serde(default)]
    pub monitor: MonitorFlag,
    #[serde(default = "default_ping")]
    pub ping: String,
}

impl TargetEntry {
    pub fn ip_addr(&self) -> Result<IpAddr, HeartbeatError> {
        self.ip.trim().parse().map_err(|_| {
            HeartbeatError::Config(format!(
                "invalid ip '{}' for {} '{}'",
                self.ip, self.kind, self.id
            ))
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, HeartbeatError> {
        Ok(SocketAddr::new(self.ip_addr()?, self.port))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_charset() -> String {
    "utf-8".to_string()
}
fn default_buffer_size() -> usize {
    8192
}
fn default_timeout() -> Duration {
    Duration::from_secs(4)
}
fn default_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_slowlog() -> Duration {
    Duration::from_millis(500)
}
fn default_tick() -> Duration {
    Duration::from_millis(100)
}
fn default_metrics_port() -> u16 {
    9879
}
fn default_ping() -> String {
    "ping\r\n".to_string()
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            charset: default_charset(),
            buffer_size: default_buffer_size(),
            timeout: default_timeout(),
            interval: default_interval(),
            slowlog: default_slowlog(),
            tick: default_tick(),
            metrics: MetricsConfig::default(),
            clusters: Vec::new(),
        }
    }
}

impl HeartbeatConfig {
    /// Loads and validates the configuration file at `path`.
    pub async fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        Self::parse(&content).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses and validates a TOML document.
    pub fn parse(content: &str) -> Result<Self> {
        let config: HeartbeatConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HeartbeatError> {
        if self.buffer_size == 0 {
            return Err(HeartbeatError::Config("buffer_size must be > 0".into()));
        }
        for (name, value) in [
            ("timeout", self.timeout),
            ("interval", self.interval),
            ("tick", self.tick),
        ] {
            if value.is_zero() {
                return Err(HeartbeatError::Config(format!("{name} must be > 0")));
            }
        }
        self.charset.parse::<Charset>()?;

        let mut cluster_names = HashSet::new();
        for cluster in &self.clusters {
            if !cluster_names.insert(cluster.name.as_str()) {
                return Err(HeartbeatError::Config(format!(
                    "duplicate cluster '{}'",
                    cluster.name
                )));
            }
            let mut targets = HashSet::new();
            for target in &cluster.targets {
                if !targets.insert((target.kind, target.id.as_str())) {
                    return Err(HeartbeatError::Config(format!(
                        "duplicate {} '{}' in cluster '{}'",
                        target.kind, target.id, cluster.name
                    )));
                }
                target.ip_addr()?;
            }
        }
        Ok(())
    }

    /// The snapshot every session handler is built from.
    pub fn handler_settings(&self) -> Result<HandlerSettings, HeartbeatError> {
        Ok(HandlerSettings {
            buffer_size: self.buffer_size,
            charset: self.charset.parse()?,
            timeout: self.timeout,
            interval: self.interval,
            slowlog: self.slowlog,
        })
    }
}
