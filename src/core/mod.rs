// src/core/mod.rs

//! The central module containing the heartbeat subsystem and its shared plumbing.

pub mod errors;
pub mod heartbeat;
pub mod metrics;

pub use errors::HeartbeatError;
