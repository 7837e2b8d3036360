//! Listener records and protocol dispatch types.
//!
//! A listener is a configured endpoint descriptor accepting inbound agent
//! connections for one protocol. Two families exist:
//! - TCP listeners are standalone; the agent link layer drives their socket.
//! - HTTP-family listeners are backed by an infrastructure [`HttpServer`]
//!   record stored separately and referenced by id.
//!
//! [`HttpServer`]: crate::servers::HttpServer

pub mod http;
pub mod tcp;

pub use http::HttpListener;
pub use tcp::TcpListener;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

use crate::servers::ServerId;

/// Flat configuration bag consumed by the entity factories.
pub type Options = HashMap<String, String>;

/// Option key selecting the protocol. Required by every factory.
pub const OPT_PROTOCOL: &str = "Protocol";
/// Option key for the listener name.
pub const OPT_NAME: &str = "Name";
/// Option key for the free-form description.
pub const OPT_DESCRIPTION: &str = "Description";
/// Option key for the bind interface address.
pub const OPT_INTERFACE: &str = "Interface";
/// Option key for the bind port.
pub const OPT_PORT: &str = "Port";
/// Option key for the PEM certificate path (TLS variants).
pub const OPT_CERT: &str = "Cert";
/// Option key for the PEM private key path (TLS variants).
pub const OPT_KEY: &str = "Key";
/// Option key for the URI paths an HTTP-family listener answers on.
pub const OPT_URLS: &str = "URLS";

/// Validate the endpoint options shared by every factory: `Interface` must
/// be an IP address and `Port` a 16-bit port number when present.
pub(crate) fn validate_endpoint(options: &Options) -> Result<(), ListenerError> {
    if let Some(value) = options.get(OPT_INTERFACE) {
        value
            .parse::<std::net::IpAddr>()
            .map_err(|e| ListenerError::InvalidOption {
                key: OPT_INTERFACE,
                value: value.clone(),
                reason: e.to_string(),
            })?;
    }
    if let Some(value) = options.get(OPT_PORT) {
        value
            .parse::<u16>()
            .map_err(|e| ListenerError::InvalidOption {
                key: OPT_PORT,
                value: value.clone(),
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

/// Unique listener identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Create a new unique listener ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Protocol family. One repository exists per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// HTTP-family protocols, backed by an infrastructure server.
    Http,
    /// Raw TCP, no infrastructure server.
    Tcp,
}

/// Transport protocol tag for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Http,
    Https,
    H2c,
    Http2,
    Http3,
}

/// Error returned when a protocol string is not recognized.
#[derive(Debug, Clone, Error)]
#[error("unrecognized protocol {0:?}")]
pub struct UnknownProtocol(pub String);

impl Protocol {
    /// Every protocol the service registers, in completion order.
    pub const REGISTERED: [Protocol; 6] = [
        Protocol::Tcp,
        Protocol::Http,
        Protocol::Https,
        Protocol::H2c,
        Protocol::Http2,
        Protocol::Http3,
    ];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::H2c => "h2c",
            Protocol::Http2 => "http2",
            Protocol::Http3 => "http3",
        }
    }

    /// The family whose repository stores listeners of this protocol.
    pub fn family(&self) -> Family {
        match self {
            Protocol::Tcp => Family::Tcp,
            _ => Family::Http,
        }
    }

    /// Whether this protocol variant terminates TLS itself.
    pub fn requires_tls(&self) -> bool {
        matches!(self, Protocol::Https | Protocol::Http2 | Protocol::Http3)
    }
}

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    // Matching is case-insensitive; unknown values are an error, never a
    // silent default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "h2c" => Ok(Protocol::H2c),
            "http2" => Ok(Protocol::Http2),
            "http3" => Ok(Protocol::Http3),
            _ => Err(UnknownProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for listener factories.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// An option value failed to parse or validate.
    #[error("option {key:?} has invalid value {value:?}: {reason}")]
    InvalidOption {
        key: &'static str,
        value: String,
        reason: String,
    },
    /// The supplied protocol does not belong to this factory's family.
    #[error("protocol {0} is not valid for this listener type")]
    WrongFamily(Protocol),
}

/// A stored listener record, tagged by family.
///
/// Every variant exposes the same capability set; callers dispatch on the
/// protocol tag, never on the concrete record type.
#[derive(Debug, Clone)]
pub enum Listener {
    Tcp(TcpListener),
    Http(HttpListener),
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        match self {
            Listener::Tcp(l) => l.id(),
            Listener::Http(l) => l.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Listener::Tcp(l) => l.name(),
            Listener::Http(l) => l.name(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Listener::Tcp(l) => l.protocol(),
            Listener::Http(l) => l.protocol(),
        }
    }

    pub fn options(&self) -> &Options {
        match self {
            Listener::Tcp(l) => l.options(),
            Listener::Http(l) => l.options(),
        }
    }

    /// The backing server record, if this listener has one.
    ///
    /// TCP listeners never carry a server reference; HTTP-family listeners
    /// always carry exactly one.
    pub fn server_id(&self) -> Option<ServerId> {
        match self {
            Listener::Tcp(_) => None,
            Listener::Http(l) => Some(l.server_id()),
        }
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        match self {
            Listener::Tcp(l) => l.created_at(),
            Listener::Http(l) => l.created_at(),
        }
    }

    pub(crate) fn set_options(&mut self, options: Options) {
        match self {
            Listener::Tcp(l) => l.set_options(options),
            Listener::Http(l) => l.set_options(options),
        }
    }
}
