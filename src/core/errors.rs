// src/core/errors.rs

//! Defines the primary error type for the heartbeat subsystem.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all failures the heartbeat subsystem can report.
///
/// Probe-level failures never reach the session controller as errors: they are turned
/// into probe outcomes by the protocol handler. This type is used by the codec, the
/// transport session and the configuration layer.
#[derive(Error, Debug, Clone)]
pub enum HeartbeatError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Reply line exceeds the session buffer of {0} bytes")]
    LineTooLong(usize),

    #[error("Character {ch:?} cannot be encoded as {charset}")]
    Unencodable { charset: &'static str, ch: char },

    #[error("Session has no remote address")]
    NoRemoteAddress,

    #[error("Unknown heartbeat target '{0}'")]
    UnknownTarget(String),

    #[error("Unknown cluster '{0}'")]
    UnknownCluster(String),

    #[error("Heartbeat target '{0}' is already registered")]
    DuplicateTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PartialEq for HeartbeatError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HeartbeatError::Io(e1), HeartbeatError::Io(e2)) => e1.to_string() == e2.to_string(),
            (HeartbeatError::LineTooLong(n1), HeartbeatError::LineTooLong(n2)) => n1 == n2,
            (
                HeartbeatError::Unencodable {
                    charset: c1,
                    ch: h1,
                },
                HeartbeatError::Unencodable {
                    charset: c2,
                    ch: h2,
                },
            ) => c1 == c2 && h1 == h2,
            (HeartbeatError::UnknownTarget(s1), HeartbeatError::UnknownTarget(s2)) => s1 == s2,
            (HeartbeatError::UnknownCluster(s1), HeartbeatError::UnknownCluster(s2)) => s1 == s2,
            (HeartbeatError::DuplicateTarget(s1), HeartbeatError::DuplicateTarget(s2)) => {
                s1 == s2
            }
            (HeartbeatError::Config(s1), HeartbeatError::Config(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for HeartbeatError {
    fn from(e: std::io::Error) -> Self {
        HeartbeatError::Io(Arc::new(e))
    }
}
