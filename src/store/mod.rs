//! Keyed in-memory repositories for listener and server records.
//!
//! One repository instance exists per entity kind / protocol family.
//! Identifier uniqueness is enforced only within a single repository; the
//! service facade probes repositories in a fixed order and never relies on
//! global uniqueness.

mod memory;

pub use memory::{MemoryListenerRepository, MemoryServerRepository};

use std::sync::Arc;

use thiserror::Error;

use crate::listeners::{Listener, ListenerId, Options};
use crate::servers::{HttpServer, ServerId};

/// Error type for repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A record with the same id already exists.
    #[error("a record with id {id} already exists")]
    Duplicate { id: String },
    /// No record matched the requested id.
    #[error("no record found for id {id}")]
    NotFound { id: String },
    /// No record matched the requested name.
    #[error("no record found for name {name:?}")]
    NameNotFound { name: String },
}

/// Keyed store for listener records of one protocol family.
///
/// Implementations are safe for concurrent callers: writes to the same
/// record are mutually exclusive and reads never observe a partially
/// written record.
pub trait ListenerRepository: Send + Sync {
    /// Store a new listener. Fails on id collision.
    fn add(&self, listener: Listener) -> Result<(), RepositoryError>;

    /// Get a listener by id.
    fn by_id(&self, id: ListenerId) -> Result<Listener, RepositoryError>;

    /// Get the first listener with the given name.
    fn by_name(&self, name: &str) -> Result<Listener, RepositoryError>;

    /// All stored listeners, in no particular order.
    fn all(&self) -> Vec<Listener>;

    /// Delete a listener. Fails if the id is absent, never silently.
    fn remove_by_id(&self, id: ListenerId) -> Result<(), RepositoryError>;

    /// Replace a listener's option map. Fails if the id is absent.
    fn update_options(&self, id: ListenerId, options: Options) -> Result<(), RepositoryError>;
}

/// Keyed store for infrastructure server records.
pub trait ServerRepository: Send + Sync {
    /// Store a new server. Fails on id collision.
    fn add(&self, server: Arc<HttpServer>) -> Result<(), RepositoryError>;

    /// Get a server by id.
    fn by_id(&self, id: ServerId) -> Result<Arc<HttpServer>, RepositoryError>;

    /// All stored servers, in no particular order.
    fn all(&self) -> Vec<Arc<HttpServer>>;

    /// Delete a server. Fails if the id is absent.
    fn remove_by_id(&self, id: ServerId) -> Result<(), RepositoryError>;
}

/// Shared listener repository handle.
pub type SharedListenerRepository = Arc<dyn ListenerRepository>;

/// Shared server repository handle.
pub type SharedServerRepository = Arc<dyn ServerRepository>;
