// src/core/heartbeat/state.rs

//! Health-state records for monitored targets.
//!
//! Records are owned by the `HbStateTable`. A session controller only holds a shared
//! reference to whichever record is current for its target and never writes to it;
//! the result processor is the only writer.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// The last known health of a target, as seen from its probe results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// No probe has completed since the record was created.
    Unknown,
    Alive,
    Failed,
}

#[derive(Debug)]
struct HealthInner {
    status: HealthStatus,
    last_reply: Option<String>,
    last_pong_at: Option<Instant>,
    last_latency: Option<Duration>,
    consecutive_failures: u32,
}

/// A versioned health record. A new version replaces a record wholesale instead of
/// resetting it in place, so holders of an old record never observe a half reset.
#[derive(Debug)]
pub struct HbState {
    version: u64,
    inner: Mutex<HealthInner>,
}

impl HbState {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            inner: Mutex::new(HealthInner {
                status: HealthStatus::Unknown,
                last_reply: None,
                last_pong_at: None,
                last_latency: None,
                consecutive_failures: 0,
            }),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn status(&self) -> HealthStatus {
        self.inner.lock().status
    }

    pub fn last_reply(&self) -> Option<String> {
        self.inner.lock().last_reply.clone()
    }

    pub fn last_pong_at(&self) -> Option<Instant> {
        self.inner.lock().last_pong_at
    }

    pub fn last_latency(&self) -> Option<Duration> {
        self.inner.lock().last_latency
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Records a successful reply. Returns `true` if the status changed to `Alive`.
    pub fn record_pong(&self, reply: String, latency: Duration) -> bool {
        let mut inner = self.inner.lock();
        let changed = inner.status != HealthStatus::Alive;
        inner.status = HealthStatus::Alive;
        inner.last_reply = Some(reply);
        inner.last_pong_at = Some(Instant::now());
        inner.last_latency = Some(latency);
        inner.consecutive_failures = 0;
        changed
    }

    /// Records a timed out or failed probe. Returns `true` if the status changed to `Failed`.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.lock();
        let changed = inner.status != HealthStatus::Failed;
        inner.status = HealthStatus::Failed;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        changed
    }
}

/// The external owner of all health records, keyed by target key.
#[derive(Debug, Default)]
pub struct HbStateTable {
    records: DashMap<String, Arc<HbState>>,
    next_version: AtomicU64,
}

impl HbStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new record for `key` with a higher version than any issued before,
    /// replacing the previous one.
    pub fn fresh(&self, key: &str) -> Arc<HbState> {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        let state = Arc::new(HbState::new(version));
        self.records.insert(key.to_string(), state.clone());
        state
    }

    pub fn current(&self, key: &str) -> Option<Arc<HbState>> {
        self.records.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<Arc<HbState>> {
        self.records.remove(key).map(|(_, state)| state)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
