// src/core/heartbeat/result.rs

//! Probe results and the processor that turns them into health records and opinions.

use super::opinion::{DecisionPipeline, OpinionKind};
use super::state::HbStateTable;
use super::types::{HeartbeatTarget, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a single ping/pong exchange produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Pong { reply: String, latency: Duration },
    Timeout,
    Failed(String),
}

impl ProbeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Pong { .. } => "pong",
            ProbeOutcome::Timeout => "timeout",
            ProbeOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HbResult {
    pub target: Arc<HeartbeatTarget>,
    pub session_id: SessionId,
    /// The handler's `active_since` stamp when the probe was sent.
    pub active_since: u64,
    pub outcome: ProbeOutcome,
}

/// Receives every reported probe result. Implementations must be cheap and must not
/// block: they are called from probe tasks while the reporting handler holds its
/// report lock, so they must not start or stop that handler's controller either.
pub trait ResultProcessor: Send + Sync {
    fn process(&self, result: HbResult);
}

/// Records results into the target's current health record and publishes an
/// opinion whenever the target's health changes.
pub struct HbResultProcessor {
    states: Arc<HbStateTable>,
    pipeline: Arc<dyn DecisionPipeline>,
}

impl HbResultProcessor {
    pub fn new(states: Arc<HbStateTable>, pipeline: Arc<dyn DecisionPipeline>) -> Self {
        Self { states, pipeline }
    }
}

impl ResultProcessor for HbResultProcessor {
    fn process(&self, result: HbResult) {
        let key = result.target.key();
        let Some(state) = self.states.current(&key) else {
            debug!("Dropping heartbeat result for untracked target {}", key);
            return;
        };

        match result.outcome {
            ProbeOutcome::Pong { reply, latency } => {
                if state.record_pong(reply, latency) {
                    info!("Heartbeat target {} is alive ({:?}).", key, latency);
                    self.pipeline
                        .submit_opinion(OpinionKind::Alive, &result.target);
                }
            }
            ProbeOutcome::Timeout | ProbeOutcome::Failed(_) => {
                let label = result.outcome.label();
                if state.record_failure() {
                    warn!("Heartbeat target {} stopped answering ({}).", key, label);
                    self.pipeline
                        .submit_opinion(OpinionKind::Failed, &result.target);
                } else {
                    debug!(
                        "Heartbeat target {} still failing ({}, {} in a row).",
                        key,
                        label,
                        state.consecutive_failures()
                    );
                }
            }
        }
    }
}
