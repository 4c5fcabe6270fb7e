// src/core/heartbeat/selector.rs

//! The event reactor that drives heartbeat sessions.
//!
//! Sessions are associated with a selector at construction (they receive a
//! `SelectorHandle` to wake it) but are only probed while they are in the selector's
//! active dispatch set, which is managed through `add_session` / `remove_session`.

use super::session::ClientSession;
use super::types::{SessionId, now_millis};
use crate::core::metrics;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::time;
use tracing::{debug, info};

/// The reactor contract consumed by session controllers.
pub trait Reactor: Send + Sync {
    /// Adds a session to the active dispatch set. Adding a present session is a no-op.
    fn add_session(&self, session: Arc<ClientSession>);

    /// Removes a session from the active dispatch set. Removing an absent id is a no-op.
    fn remove_session(&self, id: SessionId);

    /// Returns the handle sessions use to associate themselves with this reactor.
    fn selector(&self) -> SelectorHandle;
}

/// A cheap, cloneable handle to a reactor's wake-up signal.
#[derive(Debug, Clone, Default)]
pub struct SelectorHandle {
    wakeup: Arc<Notify>,
}

impl SelectorHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the reactor to run a dispatch pass now instead of at its next tick.
    pub fn wake(&self) {
        self.wakeup.notify_one();
    }

    async fn woken(&self) {
        self.wakeup.notified().await;
    }
}

/// The tokio-driven reactor. Every tick (or wake-up) it spawns one probe task for
/// each active session whose handler is due, with at most one probe in flight per
/// session.
#[derive(Debug)]
pub struct EventSelector {
    sessions: DashMap<SessionId, Arc<ClientSession>>,
    handle: SelectorHandle,
    tick: Duration,
}

impl EventSelector {
    pub fn new(tick: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            handle: SelectorHandle::new(),
            tick,
        }
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The main reactor loop. Runs until the shutdown signal is received.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Heartbeat selector started with tick {:?}.", self.tick);
        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Heartbeat selector shutting down.");
                    break;
                }
                _ = ticker.tick() => {}
                _ = self.handle.woken() => {}
            }
            self.dispatch();
        }
    }

    /// Runs one dispatch pass and returns the number of probes spawned.
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self) -> usize {
        let now = now_millis();
        let due: Vec<Arc<ClientSession>> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().handler().is_due(now))
            .map(|entry| entry.value().clone())
            .collect();

        let mut spawned = 0;
        for session in due {
            let Some(guard) = session.try_begin_probe() else {
                continue;
            };
            spawned += 1;
            tokio::spawn(async move {
                let _guard = guard;
                let handler = session.handler();
                handler.probe(&session).await;
            });
        }
        spawned
    }
}

impl Reactor for EventSelector {
    fn add_session(&self, session: Arc<ClientSession>) {
        let id = session.id();
        if self.sessions.insert(id, session).is_none() {
            debug!("Session {} added to the active dispatch set.", id);
        }
        metrics::ACTIVE_SESSIONS.set(self.sessions.len() as f64);
        self.handle.wake();
    }

    fn remove_session(&self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            debug!("Session {} removed from the active dispatch set.", id);
        }
        metrics::ACTIVE_SESSIONS.set(self.sessions.len() as f64);
    }

    fn selector(&self) -> SelectorHandle {
        self.handle.clone()
    }
}
