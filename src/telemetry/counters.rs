//! Lifecycle counters, recorded through the `metrics` facade.
//!
//! The exporter is wired up by the embedding process; without one these
//! calls are no-ops.

use metrics::counter;

/// A listener was created and persisted.
pub fn listener_created(protocol: &str) {
    counter!("listenerd_listeners_created_total", "protocol" => protocol.to_string()).increment(1);
}

/// A listener was removed from its repository.
pub fn listener_removed(protocol: &str) {
    counter!("listenerd_listeners_removed_total", "protocol" => protocol.to_string()).increment(1);
}

/// A server start request was issued.
pub fn server_started(protocol: &str) {
    counter!("listenerd_servers_started_total", "protocol" => protocol.to_string()).increment(1);
}

/// A server stop request completed.
pub fn server_stopped(protocol: &str) {
    counter!("listenerd_servers_stopped_total", "protocol" => protocol.to_string()).increment(1);
}

/// A spawned serve loop terminated with an error.
pub fn server_failed(protocol: &str) {
    counter!("listenerd_servers_failed_total", "protocol" => protocol.to_string()).increment(1);
}
