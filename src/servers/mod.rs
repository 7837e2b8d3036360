//! Infrastructure servers backing HTTP-family listeners.
//!
//! A server is the bound network-accepting process behind an HTTP-family
//! listener: address, port, TLS material, and protocol variant. Servers are
//! stored in their own repository and referenced from listeners by id.

pub mod http;

pub use http::HttpServer;

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Unique server identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(Uuid);

impl ServerId {
    /// Create a new unique server ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Observable server lifecycle state.
///
/// `Created` -> `Running` -> `Stopped` -> `Running` -> ...; a serve loop
/// that terminates with an error lands in `Failed` and keeps the error
/// text, so a fire-and-forget start is still inspectable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Running,
    Stopped,
    Failed(String),
}

impl ServerState {
    pub fn name(&self) -> &'static str {
        match self {
            ServerState::Created => "created",
            ServerState::Running => "running",
            ServerState::Stopped => "stopped",
            ServerState::Failed(_) => "failed",
        }
    }
}

/// Error type for server construction and the serve loop.
#[derive(Debug, Error)]
pub enum ServerError {
    /// An option value was rejected while building the server.
    #[error("option {key:?} has invalid value {value:?}: {reason}")]
    Configuration {
        key: &'static str,
        value: String,
        reason: String,
    },
    /// `run` was called while the serve loop is already active.
    #[error("server is already running")]
    AlreadyRunning,
    /// The serve loop failed to bind or terminated abnormally.
    #[error("serve loop failed: {0}")]
    Serve(#[source] std::io::Error),
}
