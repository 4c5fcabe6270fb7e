// src/core/heartbeat/opinion.rs

//! Opinions about target health and the pipeline they are submitted to.
//!
//! Aggregating opinions into cluster decisions happens downstream; this module only
//! carries them there.

use super::types::HeartbeatTarget;
use crate::core::metrics;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpinionKind {
    /// Forget any liveness state previously reported for the target.
    Discard,
    Alive,
    Failed,
}

impl OpinionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpinionKind::Discard => "discard",
            OpinionKind::Alive => "alive",
            OpinionKind::Failed => "failed",
        }
    }
}

impl fmt::Display for OpinionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Opinion {
    pub kind: OpinionKind,
    pub target: Arc<HeartbeatTarget>,
    pub submitted_at: Instant,
}

/// The downstream decision pipeline. Submission is call-and-forget and must never
/// block the caller.
pub trait DecisionPipeline: Send + Sync {
    fn submit_opinion(&self, kind: OpinionKind, target: &Arc<HeartbeatTarget>);
}

/// A decision pipeline backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct WorkflowExecutor {
    tx: mpsc::UnboundedSender<Opinion>,
}

impl WorkflowExecutor {
    /// Creates the executor and the receiving end its opinions are delivered to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Opinion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DecisionPipeline for WorkflowExecutor {
    fn submit_opinion(&self, kind: OpinionKind, target: &Arc<HeartbeatTarget>) {
        metrics::OPINIONS_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();
        let opinion = Opinion {
            kind,
            target: target.clone(),
            submitted_at: Instant::now(),
        };
        if self.tx.send(opinion).is_err() {
            debug!(
                "Opinion pipeline is closed; dropping {} opinion for {}.",
                kind, target
            );
        }
    }
}

/// Consumes opinions and logs them until shutdown or until every sender is gone.
/// Opinions already queued at shutdown are still logged. Returns how many were logged.
pub async fn run_opinion_log(
    mut rx: mpsc::UnboundedReceiver<Opinion>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> usize {
    let mut logged = 0;
    loop {
        tokio::select! {
            biased;

            opinion = rx.recv() => {
                let Some(opinion) = opinion else { break };
                log_opinion(&opinion);
                logged += 1;
            }
            _ = shutdown_rx.recv() => break,
        }
    }
    while let Ok(opinion) = rx.try_recv() {
        log_opinion(&opinion);
        logged += 1;
    }
    debug!("Opinion log stopped after {} opinion(s).", logged);
    logged
}

fn log_opinion(opinion: &Opinion) {
    info!(
        "Opinion {} for {} (queued {:?}).",
        opinion.kind,
        opinion.target,
        opinion.submitted_at.elapsed()
    );
}
