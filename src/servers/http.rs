//! HTTP-family infrastructure server.
//!
//! One server type covers every HTTP-family variant. HTTP and H2C serve
//! plaintext; HTTPS and HTTP2 terminate TLS with material loaded and
//! validated at construction time. HTTP3 needs a QUIC transport that is not
//! part of this build: its configuration and lifecycle are complete, but
//! `run` logs a warning and idles until stopped.
//!
//! `run` blocks its task until the server terminates or fails; callers that
//! must not block spawn it. `stop` is idempotent and bounded by the
//! configured grace period.

use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{StatusCode, Uri};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{ServerError, ServerId, ServerState};
use crate::listeners::{
    Family, Options, Protocol, OPT_CERT, OPT_INTERFACE, OPT_KEY, OPT_PORT, OPT_PROTOCOL,
};

/// Default bound on `stop`'s graceful drain.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

const DEFAULT_INTERFACE: &str = "127.0.0.1";

/// The accept/serve process behind an HTTP-family listener.
#[derive(Debug)]
pub struct HttpServer {
    id: ServerId,
    protocol: Protocol,
    addr: SocketAddr,
    tls: Option<RustlsConfig>,
    router: Router,
    stop_grace: Duration,
    state: watch::Sender<ServerState>,
    // The active serve loop's shutdown handle, tagged with its run
    // generation so a superseded run cannot clear a successor's slot.
    handle: Mutex<Option<(u64, Handle)>>,
    run_seq: AtomicU64,
}

impl HttpServer {
    /// Build a server from an option map.
    ///
    /// `Protocol` must name an HTTP-family variant. `Interface` and `Port`
    /// fall back to the variant defaults. TLS variants load the PEM
    /// certificate chain and private key named by `Cert` / `Key` here, so
    /// any invalid material fails construction and nothing is persisted.
    pub fn new(options: &Options) -> Result<Self, ServerError> {
        let raw = options
            .get(OPT_PROTOCOL)
            .ok_or_else(|| ServerError::Configuration {
                key: OPT_PROTOCOL,
                value: String::new(),
                reason: "option is required".to_string(),
            })?;
        let protocol = raw
            .parse::<Protocol>()
            .map_err(|e| ServerError::Configuration {
                key: OPT_PROTOCOL,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
        if protocol.family() != Family::Http {
            return Err(ServerError::Configuration {
                key: OPT_PROTOCOL,
                value: raw.clone(),
                reason: "not an HTTP-family protocol".to_string(),
            });
        }

        let interface = match options.get(OPT_INTERFACE) {
            Some(value) => value
                .parse::<IpAddr>()
                .map_err(|e| ServerError::Configuration {
                    key: OPT_INTERFACE,
                    value: value.clone(),
                    reason: e.to_string(),
                })?,
            None => IpAddr::from(std::net::Ipv4Addr::LOCALHOST),
        };
        let port = match options.get(OPT_PORT) {
            Some(value) => value
                .parse::<u16>()
                .map_err(|e| ServerError::Configuration {
                    key: OPT_PORT,
                    value: value.clone(),
                    reason: e.to_string(),
                })?,
            None => default_port(protocol),
        };

        let tls = if protocol.requires_tls() {
            Some(load_rustls_config(protocol, options)?)
        } else {
            None
        };

        let (state, _) = watch::channel(ServerState::Created);

        Ok(Self {
            id: ServerId::new(),
            protocol,
            addr: SocketAddr::new(interface, port),
            tls,
            router: default_router(),
            stop_grace: DEFAULT_STOP_GRACE,
            state,
            handle: Mutex::new(None),
            run_seq: AtomicU64::new(0),
        })
    }

    /// The full recognized server-level option set for a variant, with
    /// defaults. TLS variants carry `Cert` / `Key` entries the operator
    /// must fill in.
    pub fn default_options(protocol: Protocol) -> Options {
        let mut options = Options::from([
            (
                OPT_PROTOCOL.to_string(),
                protocol.as_str().to_string(),
            ),
            (OPT_INTERFACE.to_string(), DEFAULT_INTERFACE.to_string()),
            (OPT_PORT.to_string(), default_port(protocol).to_string()),
        ]);
        if protocol.requires_tls() {
            options.insert(OPT_CERT.to_string(), String::new());
            options.insert(OPT_KEY.to_string(), String::new());
        }
        options
    }

    /// Replace the transport router. The default router answers every path
    /// with 404; the comms layer installs the real agent handler.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Override the graceful-stop bound.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state.borrow().clone()
    }

    /// Subscribe to lifecycle transitions, including the eventual outcome
    /// of a serve loop launched fire-and-forget.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Bind and serve until the server is stopped or fails.
    ///
    /// Blocks the calling task for the whole server lifetime; spawn it when
    /// the caller must return immediately. The terminal state is published
    /// on the state channel before this returns.
    pub async fn run(&self) -> Result<(), ServerError> {
        if self.protocol == Protocol::Http3 {
            return self.idle_until_stopped().await;
        }

        let handle = Handle::new();
        let generation = self.run_seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut guard = self.handle.lock().unwrap();
            if guard.is_some() {
                return Err(ServerError::AlreadyRunning);
            }
            *guard = Some((generation, handle.clone()));
        }

        self.state.send_replace(ServerState::Running);
        info!(
            server = %self.id,
            protocol = %self.protocol,
            address = %self.addr,
            tls = self.tls.is_some(),
            "server started"
        );

        let app = self.router.clone().into_make_service();
        let served = match &self.tls {
            Some(tls) => {
                axum_server::bind_rustls(self.addr, tls.clone())
                    .handle(handle)
                    .serve(app)
                    .await
            }
            None => axum_server::bind(self.addr).handle(handle).serve(app).await,
        };

        // Only the owning run clears the slot and publishes a terminal
        // state; when `stop` already took the slot (and published Stopped),
        // or a restart superseded this run, the outcome here is stale.
        let owner = {
            let mut guard = self.handle.lock().unwrap();
            match guard.as_ref() {
                Some((g, _)) if *g == generation => {
                    *guard = None;
                    true
                }
                _ => false,
            }
        };

        match served {
            Ok(()) => {
                if owner {
                    self.state.send_replace(ServerState::Stopped);
                }
                info!(server = %self.id, "server stopped");
                Ok(())
            }
            Err(e) => {
                if owner {
                    self.state
                        .send_replace(ServerState::Failed(e.to_string()));
                }
                Err(ServerError::Serve(e))
            }
        }
    }

    /// Request termination of the serve loop.
    ///
    /// Idempotent: stopping a server that is not running is a successful
    /// no-op. A running server drains connections for at most the
    /// configured grace period.
    pub fn stop(&self) -> Result<(), ServerError> {
        let slot = self.handle.lock().unwrap().take();
        if let Some((_, handle)) = slot {
            debug!(server = %self.id, grace = ?self.stop_grace, "requesting graceful shutdown");
            handle.graceful_shutdown(Some(self.stop_grace));
        }
        self.state.send_if_modified(|state| {
            if matches!(state, ServerState::Running) {
                *state = ServerState::Stopped;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    // QUIC is not compiled into this build; hold the Running state until a
    // stop request arrives so the lifecycle contract stays intact.
    async fn idle_until_stopped(&self) -> Result<(), ServerError> {
        if self.state() == ServerState::Running {
            return Err(ServerError::AlreadyRunning);
        }
        warn!(
            server = %self.id,
            address = %self.addr,
            "http3 needs the QUIC transport, which is not part of this build; serving is disabled until stopped"
        );
        let mut rx = self.state.subscribe();
        self.state.send_replace(ServerState::Running);
        info!(server = %self.id, protocol = %self.protocol, "server started");
        loop {
            if !matches!(*rx.borrow_and_update(), ServerState::Running) {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn default_port(protocol: Protocol) -> u16 {
    if protocol.requires_tls() {
        443
    } else {
        80
    }
}

fn default_router() -> Router {
    Router::new().fallback(unhandled)
}

async fn unhandled(uri: Uri) -> StatusCode {
    debug!(%uri, "request on unconfigured path");
    StatusCode::NOT_FOUND
}

/// Load and validate the PEM certificate chain and private key, returning
/// a ready rustls configuration with the variant's ALPN set.
fn load_rustls_config(protocol: Protocol, options: &Options) -> Result<RustlsConfig, ServerError> {
    let cert_path = options
        .get(OPT_CERT)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::Configuration {
            key: OPT_CERT,
            value: String::new(),
            reason: "a certificate is required for TLS protocols".to_string(),
        })?;
    let cert_file = File::open(cert_path).map_err(|e| ServerError::Configuration {
        key: OPT_CERT,
        value: cert_path.clone(),
        reason: e.to_string(),
    })?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| ServerError::Configuration {
            key: OPT_CERT,
            value: cert_path.clone(),
            reason: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(ServerError::Configuration {
            key: OPT_CERT,
            value: cert_path.clone(),
            reason: "no certificates found".to_string(),
        });
    }

    let key_path = options
        .get(OPT_KEY)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::Configuration {
            key: OPT_KEY,
            value: String::new(),
            reason: "a private key is required for TLS protocols".to_string(),
        })?;
    let key_file = File::open(key_path).map_err(|e| ServerError::Configuration {
        key: OPT_KEY,
        value: key_path.clone(),
        reason: e.to_string(),
    })?;
    let mut key_reader = BufReader::new(key_file);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| ServerError::Configuration {
            key: OPT_KEY,
            value: key_path.clone(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| ServerError::Configuration {
            key: OPT_KEY,
            value: key_path.clone(),
            reason: "no private key found".to_string(),
        })?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Configuration {
            key: OPT_CERT,
            value: cert_path.clone(),
            reason: e.to_string(),
        })?;
    config.alpn_protocols = match protocol {
        Protocol::Http2 => vec![b"h2".to_vec()],
        _ => vec![b"h2".to_vec(), b"http/1.1".to_vec()],
    };

    Ok(RustlsConfig::from_config(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn options(entries: &[(&str, &str)]) -> Options {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_new_plaintext_defaults() {
        let server = HttpServer::new(&options(&[(OPT_PROTOCOL, "http")])).unwrap();
        assert_eq!(server.protocol(), Protocol::Http);
        assert_eq!(server.addr().port(), 80);
        assert_eq!(server.state(), ServerState::Created);
    }

    #[test]
    fn test_new_rejects_missing_protocol() {
        let err = HttpServer::new(&Options::new()).unwrap_err();
        assert!(matches!(err, ServerError::Configuration { key: OPT_PROTOCOL, .. }));
    }

    #[test]
    fn test_new_rejects_tcp() {
        let err = HttpServer::new(&options(&[(OPT_PROTOCOL, "tcp")])).unwrap_err();
        assert!(matches!(err, ServerError::Configuration { key: OPT_PROTOCOL, .. }));
    }

    #[test]
    fn test_new_rejects_bad_interface() {
        let err = HttpServer::new(&options(&[
            (OPT_PROTOCOL, "http"),
            (OPT_INTERFACE, "not-an-address"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ServerError::Configuration { key: OPT_INTERFACE, .. }));
    }

    #[test]
    fn test_tls_variant_rejects_missing_cert_path() {
        let err = HttpServer::new(&options(&[(OPT_PROTOCOL, "https")])).unwrap_err();
        assert!(matches!(err, ServerError::Configuration { key: OPT_CERT, .. }));
    }

    #[test]
    fn test_tls_variant_rejects_unreadable_cert() {
        let err = HttpServer::new(&options(&[
            (OPT_PROTOCOL, "https"),
            (OPT_CERT, "/nonexistent/server.crt"),
            (OPT_KEY, "/nonexistent/server.key"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ServerError::Configuration { key: OPT_CERT, .. }));
    }

    #[test]
    fn test_tls_variant_rejects_malformed_cert() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        cert.write_all(b"not a pem certificate").unwrap();
        let path = cert.path().to_str().unwrap().to_string();

        let err = HttpServer::new(&options(&[
            (OPT_PROTOCOL, "https"),
            (OPT_CERT, &path),
            (OPT_KEY, &path),
        ]))
        .unwrap_err();
        assert!(matches!(err, ServerError::Configuration { key: OPT_CERT, .. }));
    }

    #[test]
    fn test_default_options_per_variant() {
        let plain = HttpServer::default_options(Protocol::Http);
        assert_eq!(plain.get(OPT_PORT).map(String::as_str), Some("80"));
        assert!(!plain.contains_key(OPT_CERT));

        let tls = HttpServer::default_options(Protocol::Https);
        assert_eq!(tls.get(OPT_PORT).map(String::as_str), Some("443"));
        assert!(tls.contains_key(OPT_CERT));
        assert!(tls.contains_key(OPT_KEY));
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let server = HttpServer::new(&options(&[(OPT_PROTOCOL, "http")])).unwrap();
        server.stop().unwrap();
        server.stop().unwrap();
        assert_eq!(server.state(), ServerState::Created);
    }

    #[tokio::test]
    async fn test_run_until_stopped() {
        let server = Arc::new(
            HttpServer::new(&options(&[(OPT_PROTOCOL, "http"), (OPT_PORT, "0")]))
                .unwrap()
                .with_stop_grace(Duration::from_millis(100)),
        );
        let mut rx = server.subscribe();

        let task = tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        });

        loop {
            let current = rx.borrow_and_update().clone();
            match current {
                ServerState::Running => break,
                ServerState::Failed(e) => panic!("server failed to start: {e}"),
                _ => rx.changed().await.unwrap(),
            }
        }

        server.stop().unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_http3_idles_until_stopped() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        cert.write_all(TEST_CERT_PEM).unwrap();
        let mut key = tempfile::NamedTempFile::new().unwrap();
        key.write_all(TEST_KEY_PEM).unwrap();

        let server = Arc::new(
            HttpServer::new(&options(&[
                (OPT_PROTOCOL, "http3"),
                (OPT_PORT, "0"),
                (OPT_CERT, cert.path().to_str().unwrap()),
                (OPT_KEY, key.path().to_str().unwrap()),
            ]))
            .unwrap(),
        );
        let mut rx = server.subscribe();

        let task = tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        });

        loop {
            let current = rx.borrow_and_update().clone();
            match current {
                ServerState::Running => break,
                ServerState::Failed(e) => panic!("server failed to start: {e}"),
                _ => rx.changed().await.unwrap(),
            }
        }

        server.stop().unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    // Throwaway self-signed localhost material used only to satisfy the
    // constructor's TLS validation in tests.
    const TEST_CERT_PEM: &[u8] = include_bytes!("../../tests/fixtures/localhost.crt");
    const TEST_KEY_PEM: &[u8] = include_bytes!("../../tests/fixtures/localhost.key");
}
