//! Listener management facade.
//!
//! `ListenerService` is the one entry point for creating, querying,
//! reconfiguring, and driving the lifecycle of listeners across every
//! protocol family. It owns nothing but repository handles and a protocol
//! capability table built once at construction; all dispatch goes through
//! the table, and lookups probe the per-family repositories in a fixed
//! order (HTTP family first).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::listeners::{
    Family, HttpListener, Listener, ListenerError, ListenerId, Options, Protocol, TcpListener,
    UnknownProtocol, OPT_PROTOCOL,
};
use crate::servers::http::DEFAULT_STOP_GRACE;
use crate::servers::{HttpServer, ServerError};
use crate::store::{
    MemoryListenerRepository, MemoryServerRepository, RepositoryError, SharedListenerRepository,
    SharedServerRepository,
};
use crate::telemetry::counters;

/// Error type for the listener service.
///
/// Every variant names the operation it surfaced from, so a failure is
/// attributable without consulting logs.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The options map lacks the required `Protocol` key.
    #[error("{operation}: the options map does not contain a \"Protocol\" key")]
    MissingProtocol { operation: &'static str },
    /// The protocol value is not recognized by dispatch.
    #[error("{operation}: {source}")]
    UnsupportedProtocol {
        operation: &'static str,
        #[source]
        source: UnknownProtocol,
    },
    /// The server factory rejected the supplied values.
    #[error("{operation}: {source}")]
    Configuration {
        operation: &'static str,
        #[source]
        source: ServerError,
    },
    /// A listener factory rejected the supplied values.
    #[error("{operation}: {source}")]
    InvalidListener {
        operation: &'static str,
        #[source]
        source: ListenerError,
    },
    /// A repository write or lookup failed.
    #[error("{operation}: {source}")]
    Repository {
        operation: &'static str,
        #[source]
        source: RepositoryError,
    },
    /// No repository registered in the service covers the family.
    #[error("{operation}: no repository registered for the {family:?} family")]
    UnknownFamily {
        operation: &'static str,
        family: Family,
    },
    /// The id matched no listener in any repository.
    #[error("{operation}: no listener found for id {id}")]
    NotFound {
        operation: &'static str,
        id: ListenerId,
    },
    /// The name matched no listener in any repository.
    #[error("{operation}: no listener found for name {name:?}")]
    NameNotFound {
        operation: &'static str,
        name: String,
    },
    /// A lifecycle request against the bound server failed.
    #[error("{operation}: {source}")]
    Server {
        operation: &'static str,
        #[source]
        source: ServerError,
    },
}

/// One row of the protocol capability table: everything dispatch needs to
/// know about a protocol, resolved once at service construction.
#[derive(Clone)]
struct ProtocolEntry {
    protocol: Protocol,
    listener_defaults: fn() -> Options,
    server_defaults: Option<fn(Protocol) -> Options>,
}

fn capability_table() -> Vec<ProtocolEntry> {
    Protocol::REGISTERED
        .iter()
        .map(|&protocol| match protocol.family() {
            Family::Tcp => ProtocolEntry {
                protocol,
                listener_defaults: TcpListener::default_options,
                server_defaults: None,
            },
            Family::Http => ProtocolEntry {
                protocol,
                listener_defaults: HttpListener::default_options,
                server_defaults: Some(HttpServer::default_options),
            },
        })
        .collect()
}

/// Facade over the per-family listener repositories and the server
/// repository.
///
/// Cheap to clone; every clone shares the same repositories.
#[derive(Clone)]
pub struct ListenerService {
    // Probe order is fixed: HTTP family first, so a same-name listener in
    // both families resolves to the HTTP one.
    repos: Vec<(Family, SharedListenerRepository)>,
    server_repo: SharedServerRepository,
    table: Vec<ProtocolEntry>,
    stop_grace: Duration,
}

impl ListenerService {
    /// Create a service with fresh in-memory repositories.
    pub fn new() -> Self {
        Self::with_repositories(
            Arc::new(MemoryListenerRepository::new()),
            Arc::new(MemoryListenerRepository::new()),
            Arc::new(MemoryServerRepository::new()),
        )
    }

    /// Create a service over explicit repositories.
    pub fn with_repositories(
        http: SharedListenerRepository,
        tcp: SharedListenerRepository,
        servers: SharedServerRepository,
    ) -> Self {
        Self {
            repos: vec![(Family::Http, http), (Family::Tcp, tcp)],
            server_repo: servers,
            table: capability_table(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Override the graceful-stop bound applied to new servers.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Create a listener from an option map and persist it.
    ///
    /// Dispatches on the case-insensitive `Protocol` option. HTTP-family
    /// protocols get an infrastructure server built and persisted first,
    /// then the listener bound to it; the two writes are one transactional
    /// unit (a failed listener write deletes the server record again).
    /// Returns an independent copy of the stored listener.
    pub fn new_listener(&self, options: &Options) -> Result<Listener, ServiceError> {
        const OP: &str = "new_listener";
        let raw = options
            .get(OPT_PROTOCOL)
            .ok_or(ServiceError::MissingProtocol { operation: OP })?;
        let protocol = raw
            .parse::<Protocol>()
            .map_err(|source| ServiceError::UnsupportedProtocol {
                operation: OP,
                source,
            })?;

        match protocol.family() {
            Family::Http => self.new_http_listener(protocol, options),
            Family::Tcp => self.new_tcp_listener(options),
        }
    }

    fn new_http_listener(
        &self,
        protocol: Protocol,
        options: &Options,
    ) -> Result<Listener, ServiceError> {
        const OP: &str = "new_listener";
        let repo = self.repository(OP, Family::Http)?;

        let server = Arc::new(
            HttpServer::new(options)
                .map_err(|source| ServiceError::Configuration {
                    operation: OP,
                    source,
                })?
                .with_stop_grace(self.stop_grace),
        );
        let server_id = server.id();
        self.server_repo
            .add(server)
            .map_err(|source| ServiceError::Repository {
                operation: OP,
                source,
            })?;

        // From here on the server record is persisted; any failure must
        // delete it again so the pair stays atomic.
        let listener = match HttpListener::new(server_id, options) {
            Ok(listener) => Listener::Http(listener),
            Err(source) => {
                let _ = self.server_repo.remove_by_id(server_id);
                return Err(ServiceError::InvalidListener {
                    operation: OP,
                    source,
                });
            }
        };
        if let Err(source) = repo.add(listener.clone()) {
            let _ = self.server_repo.remove_by_id(server_id);
            return Err(ServiceError::Repository {
                operation: OP,
                source,
            });
        }

        counters::listener_created(protocol.as_str());
        info!(
            listener = %listener.id(),
            name = listener.name(),
            protocol = %protocol,
            server = %server_id,
            "listener created"
        );
        Ok(listener)
    }

    fn new_tcp_listener(&self, options: &Options) -> Result<Listener, ServiceError> {
        const OP: &str = "new_listener";
        let repo = self.repository(OP, Family::Tcp)?;

        let listener = Listener::Tcp(TcpListener::new(options).map_err(|source| {
            ServiceError::InvalidListener {
                operation: OP,
                source,
            }
        })?);
        repo.add(listener.clone())
            .map_err(|source| ServiceError::Repository {
                operation: OP,
                source,
            })?;

        counters::listener_created(Protocol::Tcp.as_str());
        info!(
            listener = %listener.id(),
            name = listener.name(),
            protocol = %Protocol::Tcp,
            "listener created"
        );
        Ok(listener)
    }

    /// The full recognized option set for a protocol, as key/value pairs
    /// with keys sorted strictly ascending; callers rely on the ordering.
    ///
    /// For HTTP-family protocols this is the union of listener-level and
    /// server-level defaults, with server entries merged over listener
    /// entries.
    pub fn default_options(&self, protocol: &str) -> Result<Vec<(String, String)>, ServiceError> {
        const OP: &str = "default_options";
        let protocol = protocol
            .parse::<Protocol>()
            .map_err(|source| ServiceError::UnsupportedProtocol {
                operation: OP,
                source,
            })?;
        let entry = self
            .table
            .iter()
            .find(|e| e.protocol == protocol)
            .ok_or_else(|| ServiceError::UnsupportedProtocol {
                operation: OP,
                source: UnknownProtocol(protocol.to_string()),
            })?;

        let mut merged = (entry.listener_defaults)();
        if let Some(server_defaults) = entry.server_defaults {
            merged.extend(server_defaults(protocol));
        }

        let mut pairs: Vec<(String, String)> = merged.into_iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }

    /// Aggregate lookup by id across every repository.
    pub fn listener(&self, id: ListenerId) -> Result<Listener, ServiceError> {
        self.locate("listener", id)
    }

    /// Every stored listener, across all repositories. No cross-repository
    /// ordering guarantee.
    pub fn listeners(&self) -> Vec<Listener> {
        self.repos.iter().flat_map(|(_, repo)| repo.all()).collect()
    }

    /// Aggregate lookup by name, probing repositories in priority order.
    /// When two families hold a listener of the same name, the HTTP-family
    /// one wins. That precedence is deliberate, not an error.
    pub fn listener_by_name(&self, name: &str) -> Result<Listener, ServiceError> {
        self.repos
            .iter()
            .find_map(|(_, repo)| repo.by_name(name).ok())
            .ok_or_else(|| ServiceError::NameNotFound {
                operation: "listener_by_name",
                name: name.to_string(),
            })
    }

    /// All listeners stored in the protocol's family repository.
    pub fn listeners_by_type(&self, protocol: Protocol) -> Vec<Listener> {
        match self.repository("listeners_by_type", protocol.family()) {
            Ok(repo) => repo.all(),
            Err(_) => Vec::new(),
        }
    }

    /// Names of every configured listener, for completion.
    pub fn listener_names(&self) -> Vec<String> {
        self.listeners()
            .iter()
            .map(|l| l.name().to_string())
            .collect()
    }

    /// Candidate strings for interactive completion: every registered
    /// protocol name plus the currently configured listener names.
    pub fn cli_completer(&self) -> Vec<String> {
        let mut candidates: Vec<String> = Protocol::REGISTERED
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        candidates.extend(self.listener_names());
        candidates
    }

    /// Delete a listener from its owning repository.
    ///
    /// No cascade: the bound server record (if any) is shared by reference
    /// and stays in its repository.
    pub fn remove(&self, id: ListenerId) -> Result<(), ServiceError> {
        const OP: &str = "remove";
        let listener = self.locate(OP, id)?;
        let repo = self.repository(OP, listener.protocol().family())?;
        repo.remove_by_id(id)
            .map_err(|source| ServiceError::Repository {
                operation: OP,
                source,
            })?;

        counters::listener_removed(listener.protocol().as_str());
        info!(listener = %id, name = listener.name(), "listener removed");
        Ok(())
    }

    /// Launch the listener's bound server, if it has one.
    ///
    /// The serve loop blocks until the server terminates, so it runs on its
    /// own task and this returns immediately: success means the start
    /// request was issued, not that the server is accepting connections.
    /// The task's eventual outcome is published on the server's state
    /// channel rather than discarded.
    pub fn start(&self, id: ListenerId) -> Result<(), ServiceError> {
        const OP: &str = "start";
        let listener = self.locate(OP, id)?;
        match listener.server_id() {
            // Raw TCP listeners have no infrastructure server; the agent
            // link layer owns their socket lifecycle.
            None => Ok(()),
            Some(server_id) => {
                let server =
                    self.server_repo
                        .by_id(server_id)
                        .map_err(|source| ServiceError::Repository {
                            operation: OP,
                            source,
                        })?;
                self.spawn_server(server);
                Ok(())
            }
        }
    }

    /// Synchronously request termination of the listener's bound server.
    /// A no-op for listeners without one.
    pub fn stop(&self, id: ListenerId) -> Result<(), ServiceError> {
        const OP: &str = "stop";
        let listener = self.locate(OP, id)?;
        let Some(server_id) = listener.server_id() else {
            return Ok(());
        };
        let server = self
            .server_repo
            .by_id(server_id)
            .map_err(|source| ServiceError::Repository {
                operation: OP,
                source,
            })?;
        server.stop().map_err(|source| ServiceError::Server {
            operation: OP,
            source,
        })?;

        counters::server_stopped(server.protocol().as_str());
        Ok(())
    }

    /// Synchronous stop followed by a fresh asynchronous start. A stop
    /// failure aborts the sequence and propagates unchanged.
    pub fn restart(&self, id: ListenerId) -> Result<(), ServiceError> {
        const OP: &str = "restart";
        let listener = self.locate(OP, id)?;
        let Some(server_id) = listener.server_id() else {
            return Ok(());
        };
        let server = self
            .server_repo
            .by_id(server_id)
            .map_err(|source| ServiceError::Repository {
                operation: OP,
                source,
            })?;
        server.stop().map_err(|source| ServiceError::Server {
            operation: OP,
            source,
        })?;
        self.spawn_server(server);
        Ok(())
    }

    /// Replace a listener's option map in its owning repository.
    pub fn set_options(&self, id: ListenerId, options: Options) -> Result<(), ServiceError> {
        const OP: &str = "set_options";
        let listener = self.locate(OP, id)?;
        let repo = self.repository(OP, listener.protocol().family())?;
        repo.update_options(id, options)
            .map_err(|source| ServiceError::Repository {
                operation: OP,
                source,
            })
    }

    /// Resolve a listener's bound server record, if it has one.
    pub fn server(&self, id: ListenerId) -> Result<Option<Arc<HttpServer>>, ServiceError> {
        const OP: &str = "server";
        let listener = self.locate(OP, id)?;
        match listener.server_id() {
            None => Ok(None),
            Some(server_id) => self
                .server_repo
                .by_id(server_id)
                .map(Some)
                .map_err(|source| ServiceError::Repository {
                    operation: OP,
                    source,
                }),
        }
    }

    fn locate(&self, operation: &'static str, id: ListenerId) -> Result<Listener, ServiceError> {
        self.repos
            .iter()
            .find_map(|(_, repo)| repo.by_id(id).ok())
            .ok_or(ServiceError::NotFound { operation, id })
    }

    fn repository(
        &self,
        operation: &'static str,
        family: Family,
    ) -> Result<&SharedListenerRepository, ServiceError> {
        self.repos
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, repo)| repo)
            .ok_or(ServiceError::UnknownFamily { operation, family })
    }

    fn spawn_server(&self, server: Arc<HttpServer>) {
        counters::server_started(server.protocol().as_str());
        tokio::spawn(async move {
            let id = server.id();
            match server.run().await {
                Ok(()) => {}
                Err(ServerError::AlreadyRunning) => {
                    warn!(server = %id, "start requested while already running");
                }
                Err(e) => {
                    counters::server_failed(server.protocol().as_str());
                    error!(server = %id, error = %e, "server terminated with error");
                }
            }
        });
    }
}

impl Default for ListenerService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::{OPT_INTERFACE, OPT_NAME, OPT_PORT};
    use crate::store::{ListenerRepository, ServerRepository};

    fn options(entries: &[(&str, &str)]) -> Options {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_new_listener_requires_protocol() {
        let service = ListenerService::new();
        let err = service.new_listener(&Options::new()).unwrap_err();
        assert!(matches!(err, ServiceError::MissingProtocol { .. }));
        assert!(service.listeners().is_empty());
    }

    #[test]
    fn test_new_listener_rejects_unknown_protocol() {
        let service = ListenerService::new();
        let err = service
            .new_listener(&options(&[(OPT_PROTOCOL, "smtp")]))
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedProtocol { .. }));
        assert!(service.listeners().is_empty());
    }

    #[test]
    fn test_dispatch_is_case_insensitive() {
        let service = ListenerService::new();
        for raw in ["tcp", "TCP", "tCp"] {
            let listener = service
                .new_listener(&options(&[(OPT_PROTOCOL, raw)]))
                .unwrap();
            assert_eq!(listener.protocol(), Protocol::Tcp);
        }
        let listener = service
            .new_listener(&options(&[(OPT_PROTOCOL, "HtTp")]))
            .unwrap();
        assert_eq!(listener.protocol(), Protocol::Http);
    }

    #[test]
    fn test_tcp_listener_has_no_server() {
        let service = ListenerService::new();
        let listener = service
            .new_listener(&options(&[
                (OPT_PROTOCOL, "TCP"),
                (OPT_INTERFACE, "0.0.0.0"),
                (OPT_PORT, "4444"),
            ]))
            .unwrap();

        assert_eq!(listener.protocol(), Protocol::Tcp);
        assert!(listener.server_id().is_none());
        assert_eq!(service.listeners_by_type(Protocol::Tcp).len(), 1);
        assert!(service.listeners_by_type(Protocol::Http).is_empty());
    }

    #[test]
    fn test_http_listener_pairs_with_server() {
        let servers = Arc::new(MemoryServerRepository::new());
        let service = ListenerService::with_repositories(
            Arc::new(MemoryListenerRepository::new()),
            Arc::new(MemoryListenerRepository::new()),
            servers.clone(),
        );

        let listener = service
            .new_listener(&options(&[(OPT_PROTOCOL, "http"), (OPT_PORT, "8085")]))
            .unwrap();

        let stored_servers = servers.all();
        assert_eq!(stored_servers.len(), 1);
        assert_eq!(Some(stored_servers[0].id()), listener.server_id());

        let resolved = service.server(listener.id()).unwrap().unwrap();
        assert_eq!(Some(resolved.id()), listener.server_id());
    }

    #[test]
    fn test_failed_server_construction_leaves_no_records() {
        let servers = Arc::new(MemoryServerRepository::new());
        let service = ListenerService::with_repositories(
            Arc::new(MemoryListenerRepository::new()),
            Arc::new(MemoryListenerRepository::new()),
            servers.clone(),
        );

        let err = service
            .new_listener(&options(&[
                (OPT_PROTOCOL, "HTTPS"),
                (OPT_INTERFACE, "0.0.0.0"),
                (OPT_PORT, "443"),
                ("Cert", "/does/not/exist.crt"),
            ]))
            .unwrap_err();

        assert!(matches!(err, ServiceError::Configuration { .. }));
        assert!(service.listeners().is_empty());
        assert!(servers.all().is_empty());
    }

    /// Listener repository that refuses every write, for exercising the
    /// compensating server removal.
    struct RejectingRepository;

    impl ListenerRepository for RejectingRepository {
        fn add(&self, listener: Listener) -> Result<(), RepositoryError> {
            Err(RepositoryError::Duplicate {
                id: listener.id().to_string(),
            })
        }
        fn by_id(&self, id: ListenerId) -> Result<Listener, RepositoryError> {
            Err(RepositoryError::NotFound { id: id.to_string() })
        }
        fn by_name(&self, name: &str) -> Result<Listener, RepositoryError> {
            Err(RepositoryError::NameNotFound {
                name: name.to_string(),
            })
        }
        fn all(&self) -> Vec<Listener> {
            Vec::new()
        }
        fn remove_by_id(&self, id: ListenerId) -> Result<(), RepositoryError> {
            Err(RepositoryError::NotFound { id: id.to_string() })
        }
        fn update_options(&self, id: ListenerId, _: Options) -> Result<(), RepositoryError> {
            Err(RepositoryError::NotFound { id: id.to_string() })
        }
    }

    #[test]
    fn test_listener_persist_failure_removes_server() {
        let servers = Arc::new(MemoryServerRepository::new());
        let service = ListenerService::with_repositories(
            Arc::new(RejectingRepository),
            Arc::new(MemoryListenerRepository::new()),
            servers.clone(),
        );

        let err = service
            .new_listener(&options(&[(OPT_PROTOCOL, "http")]))
            .unwrap_err();

        assert!(matches!(err, ServiceError::Repository { .. }));
        assert!(servers.all().is_empty());
    }

    #[test]
    fn test_lookup_is_inverse_of_add() {
        let service = ListenerService::new();
        let listener = service
            .new_listener(&options(&[(OPT_PROTOCOL, "tcp"), (OPT_NAME, "alpha")]))
            .unwrap();
        let id = listener.id();

        let found = service.listener(id).unwrap();
        assert_eq!(found.id(), id);
        assert_eq!(found.name(), "alpha");

        service.remove(id).unwrap();
        assert!(matches!(
            service.listener(id),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_name_lookup_prefers_http_family() {
        let service = ListenerService::new();
        service
            .new_listener(&options(&[(OPT_PROTOCOL, "tcp"), (OPT_NAME, "shared")]))
            .unwrap();
        service
            .new_listener(&options(&[(OPT_PROTOCOL, "http"), (OPT_NAME, "shared")]))
            .unwrap();

        let found = service.listener_by_name("shared").unwrap();
        assert_eq!(found.protocol(), Protocol::Http);
    }

    #[test]
    fn test_default_options_sorted_and_merged() {
        let service = ListenerService::new();

        let pairs = service.default_options("HTTPS").unwrap();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);

        // Exact union of listener-level and server-level defaults.
        let mut expected: Vec<String> = HttpListener::default_options()
            .into_keys()
            .chain(HttpServer::default_options(Protocol::Https).into_keys())
            .collect();
        expected.sort_unstable();
        expected.dedup();
        assert_eq!(
            keys,
            expected.iter().map(String::as_str).collect::<Vec<_>>()
        );

        assert!(matches!(
            service.default_options("gopher"),
            Err(ServiceError::UnsupportedProtocol { .. })
        ));
    }

    #[test]
    fn test_returned_listener_is_independent_copy() {
        let service = ListenerService::new();
        let mut listener = service
            .new_listener(&options(&[(OPT_PROTOCOL, "tcp"), (OPT_NAME, "alpha")]))
            .unwrap();

        listener.set_options(options(&[(OPT_PORT, "1")]));
        let stored = service.listener(listener.id()).unwrap();
        assert_ne!(stored.options(), listener.options());
    }

    #[test]
    fn test_set_options_replaces_stored_map() {
        let service = ListenerService::new();
        let listener = service
            .new_listener(&options(&[(OPT_PROTOCOL, "tcp"), (OPT_NAME, "alpha")]))
            .unwrap();

        let replacement = options(&[(OPT_PORT, "9001")]);
        service
            .set_options(listener.id(), replacement.clone())
            .unwrap();
        assert_eq!(
            service.listener(listener.id()).unwrap().options(),
            &replacement
        );
    }

    #[test]
    fn test_cli_completer_unions_protocols_and_names() {
        let service = ListenerService::new();
        service
            .new_listener(&options(&[(OPT_PROTOCOL, "tcp"), (OPT_NAME, "ops")]))
            .unwrap();

        let candidates = service.cli_completer();
        for protocol in Protocol::REGISTERED {
            assert!(candidates.iter().any(|c| c == protocol.as_str()));
        }
        assert!(candidates.iter().any(|c| c == "ops"));
    }

    #[tokio::test]
    async fn test_start_on_tcp_listener_is_noop() {
        let service = ListenerService::new();
        let listener = service
            .new_listener(&options(&[(OPT_PROTOCOL, "tcp")]))
            .unwrap();

        service.start(listener.id()).unwrap();
        service.stop(listener.id()).unwrap();
        service.restart(listener.id()).unwrap();
        assert!(service.server(listener.id()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_on_missing_listener_fails() {
        let service = ListenerService::new();
        let id = ListenerId::new();
        assert!(matches!(
            service.start(id),
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(service.stop(id), Err(ServiceError::NotFound { .. })));
        assert!(matches!(
            service.restart(id),
            Err(ServiceError::NotFound { .. })
        ));
    }
}
