// src/core/heartbeat/controller.rs

//! The per-target heartbeat session controller.
//!
//! An `HbSession` owns one transport session and its protocol handler, and decides
//! from the cluster mode and the target's monitor flag whether the session is in the
//! reactor's active dispatch set:
//!
//! | cluster mode | monitor flag | probing |
//! |---|---|---|
//! | on  | on    | yes |
//! | on  | off   | no  |
//! | on  | unset | no  |
//! | off | any   | no  |
//!
//! `toggle`, `start`, `stop` and `callback_delete` run under one per-controller lock.
//! Every `stop` submits exactly one `Discard` opinion, after the session has left
//! the dispatch set and the handler has been reset. Repeated explicit `stop` calls
//! are not deduplicated; the `toggle` no-op guard is what keeps configuration
//! replays from producing extra opinions.

use super::handler::{HandlerSettings, HbSessionHandler};
use super::opinion::{DecisionPipeline, OpinionKind};
use super::result::ResultProcessor;
use super::selector::Reactor;
use super::session::ClientSession;
use super::state::HbState;
use super::types::{
    ClusterMode, HeartbeatTarget, MonitorFlag, SessionId, SessionIdGenerator, now_millis,
};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The collaborators a controller is built with. The controller depends on, but does
/// not own, the reactor and the decision pipeline.
#[derive(Clone)]
pub struct HeartbeatContext {
    pub settings: HandlerSettings,
    pub reactor: Arc<dyn Reactor>,
    pub pipeline: Arc<dyn DecisionPipeline>,
    pub processor: Arc<dyn ResultProcessor>,
    pub ids: Arc<SessionIdGenerator>,
}

#[derive(Debug)]
struct ToggleState {
    monitor_flag: MonitorFlag,
    /// `None` until the first toggle, so the constructor's toggle always applies.
    prev_cluster_mode: Option<ClusterMode>,
}

pub struct HbSession {
    reactor: Arc<dyn Reactor>,
    pipeline: Arc<dyn DecisionPipeline>,
    session: Arc<ClientSession>,
    toggle_state: Mutex<ToggleState>,
    hb_state: Mutex<Arc<HbState>>,
}

impl HbSession {
    /// Builds the session/handler pair for `target` and brings it to the running
    /// state implied by `mode` and `flag`.
    ///
    /// A failure to allocate the socket is logged and otherwise ignored: the session
    /// allocates one lazily on its next probe.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &HeartbeatContext,
        target: Arc<HeartbeatTarget>,
        ip: IpAddr,
        port: u16,
        mode: ClusterMode,
        flag: MonitorFlag,
        ping_message: &str,
        hb_state: Arc<HbState>,
    ) -> Self {
        let handler = Arc::new(HbSessionHandler::new(
            ctx.settings.clone(),
            ctx.processor.clone(),
            target,
        ));
        let session = ClientSession::new(ctx.ids.generate(), handler.clone());
        if let Err(e) = session.create_channel() {
            warn!(
                "Failed to create channel for heartbeat session {} ({}): {}. It will be retried on connect.",
                session.id(),
                handler.target(),
                e
            );
        }
        session.set_selector(ctx.reactor.selector());
        session.set_remote(ip, port);
        handler.set_ping_message(ping_message);

        let controller = Self {
            reactor: ctx.reactor.clone(),
            pipeline: ctx.pipeline.clone(),
            session,
            toggle_state: Mutex::new(ToggleState {
                monitor_flag: MonitorFlag::Unset,
                prev_cluster_mode: None,
            }),
            hb_state: Mutex::new(hb_state),
        };
        controller.toggle(mode, flag);
        controller
    }

    /// Applies a cluster mode / monitor flag pair. Re-applying the pair last applied
    /// is a no-op. Cluster mode `Off` always stops, whatever the flag says.
    pub fn toggle(&self, mode: ClusterMode, flag: MonitorFlag) {
        let mut state = self.toggle_state.lock();
        if state.monitor_flag == flag && state.prev_cluster_mode == Some(mode) {
            debug!(
                "Heartbeat toggle for {} unchanged ({:?}, {:?}).",
                self.target(),
                mode,
                flag
            );
            return;
        }

        state.monitor_flag = flag;
        match mode {
            ClusterMode::On => match flag {
                MonitorFlag::On => self.start_locked(),
                MonitorFlag::Off => self.stop_locked(),
                MonitorFlag::Unset => {}
            },
            ClusterMode::Off => self.stop_locked(),
        }
        state.prev_cluster_mode = Some(mode);
    }

    pub fn start(&self) {
        let _guard = self.toggle_state.lock();
        self.start_locked();
    }

    pub fn stop(&self) {
        let _guard = self.toggle_state.lock();
        self.stop_locked();
    }

    /// Called once by the configuration layer when the target is removed. Stops the
    /// session if its monitor flag is on. The owner drops the controller afterwards.
    pub fn callback_delete(&self) {
        let state = self.toggle_state.lock();
        if state.monitor_flag == MonitorFlag::On {
            self.stop_locked();
        }
    }

    /// Asks the handler to probe at the next opportunity instead of on its cadence.
    pub fn urgent(&self) {
        self.handler().set_urgent(true);
    }

    fn start_locked(&self) {
        let handler = self.session.handler();
        handler.initialize_state(now_millis());
        self.reactor.add_session(self.session.clone());
        info!(
            "Heartbeat started for {} (session {}).",
            handler.target(),
            self.session.id()
        );
    }

    fn stop_locked(&self) {
        self.reactor.remove_session(self.session.id());

        let handler = self.session.handler();
        handler.initialize_state(0);

        self.session.disconnect();

        let target = handler.target();
        info!(
            "Heartbeat stopped for {} (session {}).",
            target,
            self.session.id()
        );
        self.pipeline.submit_opinion(OpinionKind::Discard, &target);
    }

    pub fn monitor_flag(&self) -> MonitorFlag {
        self.toggle_state.lock().monitor_flag
    }

    pub fn set_monitor_flag(&self, flag: MonitorFlag) {
        self.toggle_state.lock().monitor_flag = flag;
    }

    /// The cluster mode last applied through `toggle`.
    pub fn cluster_mode(&self) -> Option<ClusterMode> {
        self.toggle_state.lock().prev_cluster_mode
    }

    pub fn handler(&self) -> Arc<HbSessionHandler> {
        self.session.handler()
    }

    /// Rebinds the session to `handler`. The new handler takes over the activation
    /// stamp, so a running controller keeps running; the old one is deactivated and
    /// any result it still has in flight is dropped.
    pub fn set_handler(&self, handler: Arc<HbSessionHandler>) {
        let _guard = self.toggle_state.lock();
        let previous = self.session.handler();
        if Arc::ptr_eq(&previous, &handler) {
            return;
        }
        handler.initialize_state(previous.active_since());
        previous.initialize_state(0);
        self.session.set_handler(handler);
    }

    pub fn heartbeat_state(&self) -> Arc<HbState> {
        self.hb_state.lock().clone()
    }

    pub fn set_heartbeat_state(&self, hb_state: Arc<HbState>) {
        *self.hb_state.lock() = hb_state;
    }

    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    pub fn target(&self) -> Arc<HeartbeatTarget> {
        self.session.handler().target()
    }

    /// Whether the handler is actively probing.
    pub fn is_running(&self) -> bool {
        self.session.handler().is_active()
    }
}
