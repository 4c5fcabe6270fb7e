// src/core/heartbeat/types.rs

//! Small shared types: cluster mode, per-target monitor flag, target identity and
//! session identifiers.

use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// The cluster-wide switch gating whether any heartbeat monitoring runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMode {
    On,
    Off,
}

/// The per-target administrative heartbeat switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum MonitorFlag {
    #[serde(rename = "yes", alias = "Y")]
    On,
    #[serde(rename = "no", alias = "N")]
    Off,
    /// Neither on nor off. A toggle to this value stores it and does nothing else.
    #[default]
    #[serde(rename = "unset")]
    Unset,
}

/// The kind of cluster endpoint being monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A data node (partition group server).
    Pgs,
    /// A proxy in front of the data nodes.
    Gateway,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Pgs => write!(f, "pgs"),
            TargetKind::Gateway => write!(f, "gateway"),
        }
    }
}

/// Identity of a monitored endpoint. Owned by the configuration layer and shared by
/// reference with the controller, the handler and every opinion about it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeartbeatTarget {
    pub cluster: String,
    pub kind: TargetKind,
    pub id: String,
}

impl HeartbeatTarget {
    pub fn new(cluster: impl Into<String>, kind: TargetKind, id: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            kind,
            id: id.into(),
        }
    }

    /// The registry key of this target: `{cluster}/{kind}/{id}`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.cluster, self.kind, self.id)
    }
}

impl fmt::Display for HeartbeatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cluster, self.kind, self.id)
    }
}

pub type SessionId = u64;

/// Hands out process-unique session ids. Zero is never returned.
#[derive(Debug)]
pub struct SessionIdGenerator {
    next: AtomicU64,
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn generate(&self) -> SessionId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Milliseconds since the Unix epoch. Used as the handler's "active since" stamp,
/// where zero means inactive, so this never returns zero.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
        .max(1)
}
