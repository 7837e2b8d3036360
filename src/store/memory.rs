//! In-memory repository implementations.
//!
//! Volatile storage behind `RwLock<HashMap>`. All records are lost on
//! process restart; the service holds no durable state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{ListenerRepository, RepositoryError, ServerRepository};
use crate::listeners::{Listener, ListenerId, Options};
use crate::servers::{HttpServer, ServerId};

/// In-memory listener repository for one protocol family.
#[derive(Default)]
pub struct MemoryListenerRepository {
    listeners: RwLock<HashMap<ListenerId, Listener>>,
}

impl MemoryListenerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ListenerRepository for MemoryListenerRepository {
    fn add(&self, listener: Listener) -> Result<(), RepositoryError> {
        let mut listeners = self.listeners.write().unwrap();
        let id = listener.id();
        if listeners.contains_key(&id) {
            return Err(RepositoryError::Duplicate { id: id.to_string() });
        }
        debug!(listener = %id, name = listener.name(), "listener stored");
        listeners.insert(id, listener);
        Ok(())
    }

    fn by_id(&self, id: ListenerId) -> Result<Listener, RepositoryError> {
        self.listeners
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound { id: id.to_string() })
    }

    fn by_name(&self, name: &str) -> Result<Listener, RepositoryError> {
        self.listeners
            .read()
            .unwrap()
            .values()
            .find(|l| l.name() == name)
            .cloned()
            .ok_or_else(|| RepositoryError::NameNotFound {
                name: name.to_string(),
            })
    }

    fn all(&self) -> Vec<Listener> {
        self.listeners.read().unwrap().values().cloned().collect()
    }

    fn remove_by_id(&self, id: ListenerId) -> Result<(), RepositoryError> {
        let mut listeners = self.listeners.write().unwrap();
        match listeners.remove(&id) {
            Some(listener) => {
                debug!(listener = %id, name = listener.name(), "listener removed");
                Ok(())
            }
            None => Err(RepositoryError::NotFound { id: id.to_string() }),
        }
    }

    fn update_options(&self, id: ListenerId, options: Options) -> Result<(), RepositoryError> {
        let mut listeners = self.listeners.write().unwrap();
        match listeners.get_mut(&id) {
            Some(listener) => {
                listener.set_options(options);
                Ok(())
            }
            None => Err(RepositoryError::NotFound { id: id.to_string() }),
        }
    }
}

/// In-memory server repository.
#[derive(Default)]
pub struct MemoryServerRepository {
    servers: RwLock<HashMap<ServerId, Arc<HttpServer>>>,
}

impl MemoryServerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServerRepository for MemoryServerRepository {
    fn add(&self, server: Arc<HttpServer>) -> Result<(), RepositoryError> {
        let mut servers = self.servers.write().unwrap();
        let id = server.id();
        if servers.contains_key(&id) {
            return Err(RepositoryError::Duplicate { id: id.to_string() });
        }
        debug!(server = %id, protocol = %server.protocol(), "server stored");
        servers.insert(id, server);
        Ok(())
    }

    fn by_id(&self, id: ServerId) -> Result<Arc<HttpServer>, RepositoryError> {
        self.servers
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound { id: id.to_string() })
    }

    fn all(&self) -> Vec<Arc<HttpServer>> {
        self.servers.read().unwrap().values().cloned().collect()
    }

    fn remove_by_id(&self, id: ServerId) -> Result<(), RepositoryError> {
        let mut servers = self.servers.write().unwrap();
        match servers.remove(&id) {
            Some(_) => {
                debug!(server = %id, "server removed");
                Ok(())
            }
            None => Err(RepositoryError::NotFound { id: id.to_string() }),
        }
    }
}
