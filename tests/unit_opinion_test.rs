use hbwarden::core::heartbeat::opinion::{
    DecisionPipeline, OpinionKind, WorkflowExecutor, run_opinion_log,
};
use hbwarden::core::heartbeat::types::{HeartbeatTarget, TargetKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[tokio::test]
async fn test_opinions_queued_before_shutdown_are_logged() {
    let (executor, rx) = WorkflowExecutor::new();
    let target = Arc::new(HeartbeatTarget::new("c1", TargetKind::Pgs, "1"));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    for _ in 0..3 {
        executor.submit_opinion(OpinionKind::Discard, &target);
    }
    shutdown_tx.send(()).unwrap();

    let logged = tokio::time::timeout(Duration::from_secs(1), run_opinion_log(rx, shutdown_rx))
        .await
        .unwrap();
    assert_eq!(logged, 3);
}

#[tokio::test]
async fn test_opinion_log_stops_when_every_sender_is_gone() {
    let (executor, rx) = WorkflowExecutor::new();
    let target = Arc::new(HeartbeatTarget::new("c1", TargetKind::Gateway, "2"));
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    executor.submit_opinion(OpinionKind::Alive, &target);
    executor.submit_opinion(OpinionKind::Failed, &target);
    drop(executor);

    let logged = tokio::time::timeout(Duration::from_secs(1), run_opinion_log(rx, shutdown_rx))
        .await
        .unwrap();
    assert_eq!(logged, 2);
}

#[tokio::test]
async fn test_submitting_to_a_closed_pipeline_does_not_fail() {
    let (executor, rx) = WorkflowExecutor::new();
    drop(rx);
    let target = Arc::new(HeartbeatTarget::new("c1", TargetKind::Pgs, "3"));

    executor.submit_opinion(OpinionKind::Discard, &target);
}
