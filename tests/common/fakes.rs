// tests/common/fakes.rs

//! Recording stand-ins for the reactor, the decision pipeline and the result
//! processor, so controller behaviour can be observed without a real selector, plus
//! loopback servers for the probe path.

#![allow(dead_code)]

use hbwarden::core::heartbeat::controller::{HbSession, HeartbeatContext};
use hbwarden::core::heartbeat::handler::HandlerSettings;
use hbwarden::core::heartbeat::opinion::{DecisionPipeline, OpinionKind};
use hbwarden::core::heartbeat::result::{HbResult, ResultProcessor};
use hbwarden::core::heartbeat::selector::{Reactor, SelectorHandle};
use hbwarden::core::heartbeat::session::ClientSession;
use hbwarden::core::heartbeat::state::HbState;
use hbwarden::core::heartbeat::types::{
    ClusterMode, HeartbeatTarget, MonitorFlag, SessionId, SessionIdGenerator, TargetKind,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorEvent {
    Add(SessionId),
    Remove(SessionId),
}

#[derive(Debug, Default)]
pub struct RecordingReactor {
    events: Mutex<Vec<ReactorEvent>>,
    active: Mutex<HashSet<SessionId>>,
    handle: SelectorHandle,
}

impl RecordingReactor {
    pub fn events(&self) -> Vec<ReactorEvent> {
        self.events.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn adds(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ReactorEvent::Add(_)))
            .count()
    }

    pub fn removes(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ReactorEvent::Remove(_)))
            .count()
    }

    pub fn is_active(&self, id: SessionId) -> bool {
        self.active.lock().contains(&id)
    }

    pub fn active_ids(&self) -> HashSet<SessionId> {
        self.active.lock().clone()
    }
}

impl Reactor for RecordingReactor {
    fn add_session(&self, session: Arc<ClientSession>) {
        self.events.lock().push(ReactorEvent::Add(session.id()));
        self.active.lock().insert(session.id());
    }

    fn remove_session(&self, id: SessionId) {
        self.events.lock().push(ReactorEvent::Remove(id));
        self.active.lock().remove(&id);
    }

    fn selector(&self) -> SelectorHandle {
        self.handle.clone()
    }
}

/// One submitted opinion plus the reactor's active set at the time of submission.
#[derive(Debug, Clone)]
pub struct Submitted {
    pub kind: OpinionKind,
    pub target: Arc<HeartbeatTarget>,
    pub active_at_submit: HashSet<SessionId>,
}

pub struct RecordingPipeline {
    reactor: Arc<RecordingReactor>,
    opinions: Mutex<Vec<Submitted>>,
}

impl RecordingPipeline {
    pub fn new(reactor: Arc<RecordingReactor>) -> Self {
        Self {
            reactor,
            opinions: Mutex::new(Vec::new()),
        }
    }

    pub fn opinions(&self) -> Vec<Submitted> {
        self.opinions.lock().clone()
    }

    pub fn count(&self, kind: OpinionKind) -> usize {
        self.opinions
            .lock()
            .iter()
            .filter(|o| o.kind == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.opinions.lock().len()
    }
}

impl DecisionPipeline for RecordingPipeline {
    fn submit_opinion(&self, kind: OpinionKind, target: &Arc<HeartbeatTarget>) {
        let active_at_submit = self.reactor.active_ids();
        self.opinions.lock().push(Submitted {
            kind,
            target: target.clone(),
            active_at_submit,
        });
    }
}

#[derive(Debug, Default)]
pub struct RecordingProcessor {
    results: Mutex<Vec<HbResult>>,
}

impl RecordingProcessor {
    pub fn results(&self) -> Vec<HbResult> {
        self.results.lock().clone()
    }
}

impl ResultProcessor for RecordingProcessor {
    fn process(&self, result: HbResult) {
        self.results.lock().push(result);
    }
}

pub struct Harness {
    pub ctx: HeartbeatContext,
    pub reactor: Arc<RecordingReactor>,
    pub pipeline: Arc<RecordingPipeline>,
    pub processor: Arc<RecordingProcessor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(HandlerSettings::default())
    }

    pub fn with_settings(settings: HandlerSettings) -> Self {
        let reactor = Arc::new(RecordingReactor::default());
        let pipeline = Arc::new(RecordingPipeline::new(reactor.clone()));
        let processor = Arc::new(RecordingProcessor::default());
        let ctx = HeartbeatContext {
            settings,
            reactor: reactor.clone(),
            pipeline: pipeline.clone(),
            processor: processor.clone(),
            ids: Arc::new(SessionIdGenerator::new()),
        };
        Self {
            ctx,
            reactor,
            pipeline,
            processor,
        }
    }

    /// Builds a controller for pgs `id` in cluster "c1" pointing at 127.0.0.1:`port`.
    pub fn controller(&self, id: &str, mode: ClusterMode, flag: MonitorFlag) -> HbSession {
        self.controller_at(id, 7000, mode, flag)
    }

    pub fn controller_at(
        &self,
        id: &str,
        port: u16,
        mode: ClusterMode,
        flag: MonitorFlag,
    ) -> HbSession {
        let target = Arc::new(HeartbeatTarget::new("c1", TargetKind::Pgs, id));
        HbSession::new(
            &self.ctx,
            target,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            mode,
            flag,
            "ping\r\n",
            Arc::new(HbState::new(1)),
        )
    }
}

/// A loopback server answering every received line with `+PONG\r\n`. The counter
/// tracks accepted connections.
pub async fn spawn_pong_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let (reader, mut writer) = socket.into_split();
                let mut lines = BufReader::new(reader).lines();
                while let Ok(Some(_)) = lines.next_line().await {
                    if writer.write_all(b"+PONG\r\n").await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    (addr, accepted)
}

/// A loopback server that accepts connections and never answers.
pub async fn spawn_silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Polls `check` until it holds, panicking after two seconds.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
