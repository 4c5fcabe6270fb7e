// src/core/heartbeat/checker.rs

//! The owner of every heartbeat session controller.
//!
//! The checker is the configuration layer's entry point: it tracks each cluster's
//! mode, builds a controller when a target appears, routes mode and flag changes to
//! `toggle`, and runs `callback_delete` before discarding a controller whose target
//! was removed.
//!
//! Cluster mode changes, flag changes and target (un)registration run under one
//! membership lock, so a controller is never built from a mode that is being
//! replaced.

use super::controller::{HbSession, HeartbeatContext};
use super::handler::HandlerSettings;
use super::opinion::DecisionPipeline;
use super::result::{HbResultProcessor, ResultProcessor};
use super::selector::{EventSelector, Reactor};
use super::state::{HbState, HbStateTable};
use super::types::{ClusterMode, HeartbeatTarget, MonitorFlag, SessionIdGenerator};
use crate::config::{HeartbeatConfig, TargetEntry};
use crate::core::errors::HeartbeatError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A registered controller plus the construction-time inputs that cannot be changed
/// on a live controller.
struct Registered {
    controller: Arc<HbSession>,
    addr: SocketAddr,
    ping: String,
}

pub struct HeartbeatChecker {
    selector: Arc<EventSelector>,
    states: Arc<HbStateTable>,
    pipeline: Arc<dyn DecisionPipeline>,
    processor: Arc<dyn ResultProcessor>,
    ids: Arc<SessionIdGenerator>,
    settings: RwLock<HandlerSettings>,
    clusters: DashMap<String, ClusterMode>,
    targets: DashMap<String, Registered>,
    membership: Mutex<()>,
}

impl HeartbeatChecker {
    pub fn new(
        settings: HandlerSettings,
        pipeline: Arc<dyn DecisionPipeline>,
        tick: Duration,
    ) -> Self {
        let states = Arc::new(HbStateTable::new());
        let processor = Arc::new(HbResultProcessor::new(states.clone(), pipeline.clone()));
        Self {
            selector: Arc::new(EventSelector::new(tick)),
            states,
            pipeline,
            processor,
            ids: Arc::new(SessionIdGenerator::new()),
            settings: RwLock::new(settings),
            clusters: DashMap::new(),
            targets: DashMap::new(),
            membership: Mutex::new(()),
        }
    }

    pub fn selector(&self) -> Arc<EventSelector> {
        self.selector.clone()
    }

    pub fn states(&self) -> Arc<HbStateTable> {
        self.states.clone()
    }

    fn context(&self) -> HeartbeatContext {
        HeartbeatContext {
            settings: self.settings.read().clone(),
            reactor: self.selector.clone() as Arc<dyn Reactor>,
            pipeline: self.pipeline.clone(),
            processor: self.processor.clone(),
            ids: self.ids.clone(),
        }
    }

    pub fn add_cluster(&self, name: &str, mode: ClusterMode) -> Result<(), HeartbeatError> {
        let _membership = self.membership.lock();
        match self.clusters.entry(name.to_string()) {
            Entry::Occupied(_) => Err(HeartbeatError::Config(format!(
                "cluster '{name}' already exists"
            ))),
            Entry::Vacant(v) => {
                v.insert(mode);
                info!("Tracking cluster '{}' (mode {:?}).", name, mode);
                Ok(())
            }
        }
    }

    /// Unregisters every target of the cluster, then forgets the cluster.
    pub fn remove_cluster(&self, name: &str) -> Result<(), HeartbeatError> {
        let _membership = self.membership.lock();
        if !self.clusters.contains_key(name) {
            return Err(HeartbeatError::UnknownCluster(name.to_string()));
        }
        for key in self.keys_of_cluster(name) {
            self.unregister_locked(&key)?;
        }
        self.clusters.remove(name);
        info!("Stopped tracking cluster '{}'.", name);
        Ok(())
    }

    pub fn cluster_mode(&self, name: &str) -> Option<ClusterMode> {
        self.clusters.get(name).map(|mode| *mode)
    }

    /// Builds a controller for a new target, started or stopped according to the
    /// cluster's current mode and the target's flag.
    pub fn register_target(
        &self,
        cluster: &str,
        entry: &TargetEntry,
    ) -> Result<Arc<HbSession>, HeartbeatError> {
        let _membership = self.membership.lock();
        self.register_locked(cluster, entry)
    }

    fn register_locked(
        &self,
        cluster: &str,
        entry: &TargetEntry,
    ) -> Result<Arc<HbSession>, HeartbeatError> {
        let mode = self
            .cluster_mode(cluster)
            .ok_or_else(|| HeartbeatError::UnknownCluster(cluster.to_string()))?;
        let addr = entry.addr()?;
        let target = Arc::new(HeartbeatTarget::new(cluster, entry.kind, entry.id.clone()));
        let key = target.key();

        match self.targets.entry(key.clone()) {
            Entry::Occupied(_) => Err(HeartbeatError::DuplicateTarget(key)),
            Entry::Vacant(v) => {
                let hb_state = self.states.fresh(&key);
                let controller = Arc::new(HbSession::new(
                    &self.context(),
                    target,
                    addr.ip(),
                    addr.port(),
                    mode,
                    entry.monitor,
                    &entry.ping,
                    hb_state,
                ));
                info!(
                    "Registered heartbeat target {} at {} (session {}).",
                    key,
                    addr,
                    controller.id()
                );
                v.insert(Registered {
                    controller: controller.clone(),
                    addr,
                    ping: entry.ping.clone(),
                });
                Ok(controller)
            }
        }
    }

    /// Runs the controller's delete callback, then drops it and its health record.
    pub fn unregister_target(&self, key: &str) -> Result<(), HeartbeatError> {
        let _membership = self.membership.lock();
        self.unregister_locked(key)
    }

    fn unregister_locked(&self, key: &str) -> Result<(), HeartbeatError> {
        let (_, registered) = self
            .targets
            .remove(key)
            .ok_or_else(|| HeartbeatError::UnknownTarget(key.to_string()))?;
        registered.controller.callback_delete();
        self.states.remove(key);
        info!("Unregistered heartbeat target {}.", key);
        Ok(())
    }

    pub fn set_cluster_mode(
        &self,
        cluster: &str,
        mode: ClusterMode,
    ) -> Result<(), HeartbeatError> {
        let _membership = self.membership.lock();
        match self.clusters.get_mut(cluster) {
            Some(mut current) => *current = mode,
            None => return Err(HeartbeatError::UnknownCluster(cluster.to_string())),
        }
        for controller in self.controllers_of_cluster(cluster) {
            controller.toggle(mode, controller.monitor_flag());
        }
        Ok(())
    }

    pub fn set_monitor_flag(&self, key: &str, flag: MonitorFlag) -> Result<(), HeartbeatError> {
        let _membership = self.membership.lock();
        let controller = self.require(key)?;
        let cluster = controller.target().cluster.clone();
        let mode = self
            .cluster_mode(&cluster)
            .ok_or(HeartbeatError::UnknownCluster(cluster))?;
        controller.toggle(mode, flag);
        Ok(())
    }

    pub fn urgent(&self, key: &str) -> Result<(), HeartbeatError> {
        self.require(key)?.urgent();
        Ok(())
    }

    /// Replaces the target's health record with a fresh one.
    pub fn reset_health(&self, key: &str) -> Result<Arc<HbState>, HeartbeatError> {
        let controller = self.require(key)?;
        let hb_state = self.states.fresh(key);
        controller.set_heartbeat_state(hb_state.clone());
        Ok(hb_state)
    }

    pub fn controller(&self, key: &str) -> Option<Arc<HbSession>> {
        self.targets.get(key).map(|r| r.controller.clone())
    }

    fn require(&self, key: &str) -> Result<Arc<HbSession>, HeartbeatError> {
        self.controller(key)
            .ok_or_else(|| HeartbeatError::UnknownTarget(key.to_string()))
    }

    pub fn keys(&self) -> Vec<String> {
        self.targets.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn controllers_of_cluster(&self, cluster: &str) -> Vec<Arc<HbSession>> {
        self.targets
            .iter()
            .filter(|e| e.value().controller.target().cluster == cluster)
            .map(|e| e.value().controller.clone())
            .collect()
    }

    fn keys_of_cluster(&self, cluster: &str) -> Vec<String> {
        self.targets
            .iter()
            .filter(|e| e.value().controller.target().cluster == cluster)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Stops every running controller. Used on shutdown.
    pub fn stop_all(&self) {
        let _membership = self.membership.lock();
        let running: Vec<Arc<HbSession>> = self
            .targets
            .iter()
            .filter(|e| e.value().controller.is_running())
            .map(|e| e.value().controller.clone())
            .collect();
        for controller in running {
            controller.stop();
        }
    }

    /// Brings the tracked clusters and targets in line with `config`.
    ///
    /// New targets are registered and vanished ones unregistered. A target whose
    /// address or ping message changed is replaced by a new controller, as are all
    /// targets when the handler settings changed; everything else goes through
    /// `toggle`, which ignores unchanged pairs.
    pub fn apply(&self, config: &HeartbeatConfig) -> Result<(), HeartbeatError> {
        config.validate()?;
        let settings = config.handler_settings()?;
        let _membership = self.membership.lock();
        let rebuild_all = {
            let mut current = self.settings.write();
            if *current != settings {
                *current = settings;
                true
            } else {
                false
            }
        };
        if rebuild_all && !self.is_empty() {
            info!("Heartbeat handler settings changed; rebuilding all sessions.");
        }

        let mut desired = HashSet::new();
        for cluster in &config.clusters {
            self.clusters.insert(cluster.name.clone(), cluster.mode);

            for entry in &cluster.targets {
                let key = HeartbeatTarget::new(&cluster.name, entry.kind, &entry.id).key();
                let addr = entry.addr()?;
                let existing = self
                    .targets
                    .get(&key)
                    .map(|r| (r.controller.clone(), r.addr == addr && r.ping == entry.ping));

                match existing {
                    Some((controller, true)) if !rebuild_all => {
                        controller.toggle(cluster.mode, entry.monitor);
                    }
                    Some(_) => {
                        self.unregister_locked(&key)?;
                        self.register_locked(&cluster.name, entry)?;
                    }
                    None => {
                        self.register_locked(&cluster.name, entry)?;
                    }
                }
                desired.insert(key);
            }
        }

        let stale: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|key| !desired.contains(key))
            .collect();
        for key in stale {
            self.unregister_locked(&key)?;
        }

        let names: HashSet<&str> = config.clusters.iter().map(|c| c.name.as_str()).collect();
        self.clusters.retain(|name, _| names.contains(name.as_str()));
        Ok(())
    }
}
