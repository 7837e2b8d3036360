//! HTTP-family listener records.
//!
//! An HTTP-family listener is always paired with exactly one infrastructure
//! server record, created alongside it. The listener stores only the server
//! id; the server itself lives in the server repository and is shared by
//! reference.

use chrono::{DateTime, Utc};

use super::{
    validate_endpoint, Family, ListenerError, ListenerId, Options, Protocol, OPT_DESCRIPTION,
    OPT_NAME, OPT_PROTOCOL, OPT_URLS,
};
use crate::servers::ServerId;

/// A configured HTTP-family listener.
#[derive(Debug, Clone)]
pub struct HttpListener {
    id: ListenerId,
    name: String,
    protocol: Protocol,
    options: Options,
    server_id: ServerId,
    created_at: DateTime<Utc>,
}

impl HttpListener {
    /// Build an HTTP-family listener bound to an already constructed server.
    ///
    /// The `Protocol` option is required and must name an HTTP-family
    /// variant; `Interface` and `Port` are validated when present.
    pub fn new(server_id: ServerId, options: &Options) -> Result<Self, ListenerError> {
        let raw = options
            .get(OPT_PROTOCOL)
            .ok_or_else(|| ListenerError::InvalidOption {
                key: OPT_PROTOCOL,
                value: String::new(),
                reason: "option is required".to_string(),
            })?;
        let protocol = raw
            .parse::<Protocol>()
            .map_err(|e| ListenerError::InvalidOption {
                key: OPT_PROTOCOL,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
        if protocol.family() != Family::Http {
            return Err(ListenerError::WrongFamily(protocol));
        }
        validate_endpoint(options)?;

        let id = ListenerId::new();
        let name = options
            .get(OPT_NAME)
            .cloned()
            .unwrap_or_else(|| format!("{}-{}", protocol, &id.to_string()[..8]));

        Ok(Self {
            id,
            name,
            protocol,
            options: options.clone(),
            server_id,
            created_at: Utc::now(),
        })
    }

    /// The listener-level option set with defaults. Server-level options
    /// (interface, port, TLS material) come from the server factory.
    pub fn default_options() -> Options {
        Options::from([
            (OPT_NAME.to_string(), "http-listener".to_string()),
            (
                OPT_DESCRIPTION.to_string(),
                "HTTP-family listener".to_string(),
            ),
            (OPT_URLS.to_string(), "/".to_string()),
        ])
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Id of the backing server record.
    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn set_options(&mut self, options: Options) {
        self.options = options;
    }
}
