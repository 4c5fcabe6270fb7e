// src/core/heartbeat/handler.rs

//! The ping/pong protocol handler bound to one transport session.
//!
//! The handler is the single source of truth for whether its session is actively
//! probing: `active_since` holds the wall-clock millis at which probing was last
//! (re)started, and zero means inactive. Reports and state resets are serialized
//! on one lock, so a result is either reported before a stop resets the handler or
//! dropped as stale.

use super::codec::{Charset, PingCodec};
use super::result::{HbResult, ProbeOutcome, ResultProcessor};
use super::session::ClientSession;
use super::types::{HeartbeatTarget, now_millis};
use crate::core::errors::HeartbeatError;
use crate::core::metrics;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, warn};

/// Handler parameters, copied from configuration when a session controller is built
/// and never re-read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerSettings {
    /// Read buffer capacity; also the longest reply line accepted.
    pub buffer_size: usize,
    pub charset: Charset,
    /// How long a single ping may take before it counts as timed out.
    pub timeout: Duration,
    /// The regular probe cadence.
    pub interval: Duration,
    /// Replies slower than this are logged.
    pub slowlog: Duration,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            charset: Charset::Utf8,
            timeout: Duration::from_secs(4),
            interval: Duration::from_secs(1),
            slowlog: Duration::from_millis(500),
        }
    }
}

pub struct HbSessionHandler {
    settings: HandlerSettings,
    processor: Arc<dyn ResultProcessor>,
    target: Mutex<Arc<HeartbeatTarget>>,
    session: Mutex<Weak<ClientSession>>,
    ping_message: Mutex<String>,
    active_since: AtomicU64,
    last_ping: AtomicU64,
    urgent: AtomicBool,
    /// Held while resetting the probing state and while reporting a result.
    report_lock: Mutex<()>,
}

impl HbSessionHandler {
    pub fn new(
        settings: HandlerSettings,
        processor: Arc<dyn ResultProcessor>,
        target: Arc<HeartbeatTarget>,
    ) -> Self {
        Self {
            settings,
            processor,
            target: Mutex::new(target),
            session: Mutex::new(Weak::new()),
            ping_message: Mutex::new(String::new()),
            active_since: AtomicU64::new(0),
            last_ping: AtomicU64::new(0),
            urgent: AtomicBool::new(false),
            report_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    pub fn codec(&self) -> PingCodec {
        PingCodec::new(self.settings.charset, self.settings.buffer_size)
    }

    /// Resets the probing state. A non-zero timestamp marks the handler active as of
    /// that time and makes it due immediately; zero marks it inactive.
    ///
    /// Waits for a result report in progress to finish.
    pub fn initialize_state(&self, timestamp: u64) {
        let _report = self.report_lock.lock();
        self.urgent.store(false, Ordering::Release);
        self.last_ping.store(0, Ordering::Release);
        self.active_since.store(timestamp, Ordering::Release);
    }

    pub fn active_since(&self) -> u64 {
        self.active_since.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active_since() != 0
    }

    /// Flags the next probe cycle as urgent and wakes the session's selector.
    pub fn set_urgent(&self, urgent: bool) {
        self.urgent.store(urgent, Ordering::Release);
        if urgent && let Some(session) = self.session() {
            session.wake();
        }
    }

    pub fn is_urgent(&self) -> bool {
        self.urgent.load(Ordering::Acquire)
    }

    pub fn set_ping_message(&self, message: impl Into<String>) {
        *self.ping_message.lock() = message.into();
    }

    pub fn ping_message(&self) -> String {
        self.ping_message.lock().clone()
    }

    pub fn set_target(&self, target: Arc<HeartbeatTarget>) {
        *self.target.lock() = target;
    }

    pub fn target(&self) -> Arc<HeartbeatTarget> {
        self.target.lock().clone()
    }

    pub fn set_session(&self, session: Weak<ClientSession>) {
        *self.session.lock() = session;
    }

    pub fn session(&self) -> Option<Arc<ClientSession>> {
        self.session.lock().upgrade()
    }

    /// Whether a probe should be sent at `now` (wall-clock millis).
    pub fn is_due(&self, now: u64) -> bool {
        if !self.is_active() {
            return false;
        }
        if self.is_urgent() {
            return true;
        }
        let last = self.last_ping.load(Ordering::Acquire);
        last == 0 || now.saturating_sub(last) >= self.settings.interval.as_millis() as u64
    }

    /// Runs one ping/pong exchange over `session` and reports the outcome.
    ///
    /// The outcome is dropped, not reported, if probing was stopped or restarted, or
    /// the session disconnected, while the exchange was in flight.
    pub async fn probe(&self, session: &ClientSession) {
        let active_since = self.active_since();
        if active_since == 0 {
            return;
        }
        self.urgent.store(false, Ordering::Release);
        self.last_ping.store(now_millis(), Ordering::Release);

        let generation = session.generation();
        let started = Instant::now();
        let ping = self.ping_message();

        let outcome = match time::timeout(
            self.settings.timeout,
            self.exchange(session, ping, generation),
        )
        .await
        {
            Ok(Ok(reply)) => ProbeOutcome::Pong {
                reply,
                latency: started.elapsed(),
            },
            Ok(Err(e)) => ProbeOutcome::Failed(e.to_string()),
            Err(_) => ProbeOutcome::Timeout,
        };

        let _report = self.report_lock.lock();
        if session.generation() != generation || self.active_since() != active_since {
            debug!(
                "Discarding stale heartbeat result for session {}: {:?}",
                session.id(),
                outcome
            );
            return;
        }

        metrics::PROBES_TOTAL
            .with_label_values(&[outcome.label()])
            .inc();
        if let ProbeOutcome::Pong { latency, .. } = &outcome {
            metrics::PROBE_LATENCY_SECONDS.observe(latency.as_secs_f64());
            if *latency > self.settings.slowlog {
                metrics::SLOW_REPLIES_TOTAL.inc();
                warn!(
                    "Slow heartbeat reply from {} ({:?}): {:?} exceeds slowlog threshold {:?}",
                    self.target(),
                    session.remote(),
                    latency,
                    self.settings.slowlog
                );
            }
        }

        self.processor.process(HbResult {
            target: self.target(),
            session_id: session.id(),
            active_since,
            outcome,
        });
    }

    /// A failed exchange drops the stream, leaving the session closed so that the
    /// next probe reconnects.
    async fn exchange(
        &self,
        session: &ClientSession,
        ping: String,
        generation: u64,
    ) -> Result<String, HeartbeatError> {
        let mut stream = session.open(self.codec(), self.settings.buffer_size).await?;
        stream.send(ping).await?;
        let reply = match stream.next().await {
            Some(reply) => reply?,
            None => return Err(HeartbeatError::ConnectionClosed),
        };
        session.restore(stream, generation);
        Ok(reply)
    }
}
