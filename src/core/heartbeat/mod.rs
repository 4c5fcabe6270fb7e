// src/core/heartbeat/mod.rs

//! Per-target heartbeat monitoring for cluster coordination.
//!
//! For every monitored endpoint (a data node or a proxy) the checker owns one
//! `HbSession` controller. A controller:
//! - Owns a transport session and the ping/pong handler bound to it.
//! - Combines the cluster-wide mode with the target's monitor flag to decide whether
//!   the session sits in the selector's active dispatch set.
//! - Submits a `Discard` opinion to the decision pipeline whenever it stops.
//!
//! Probe results flow from the handler to the result processor, which keeps the
//! target's health record and reports health transitions as opinions.

pub mod checker;
pub mod codec;
pub mod controller;
pub mod handler;
pub mod opinion;
pub mod result;
pub mod selector;
pub mod session;
pub mod state;
pub mod types;

pub use checker::HeartbeatChecker;
pub use controller::{HbSession, HeartbeatContext};
pub use types::{ClusterMode, HeartbeatTarget, MonitorFlag, TargetKind};
