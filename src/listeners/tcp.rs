//! Raw TCP listener records.
//!
//! A TCP listener is a standalone record: there is no infrastructure server
//! behind it, and its socket lifecycle is driven by the agent link layer,
//! not by this service.

use chrono::{DateTime, Utc};

use super::{
    validate_endpoint, ListenerError, ListenerId, Options, Protocol, OPT_DESCRIPTION,
    OPT_INTERFACE, OPT_NAME, OPT_PORT, OPT_PROTOCOL,
};

/// A configured raw TCP listener.
#[derive(Debug, Clone)]
pub struct TcpListener {
    id: ListenerId,
    name: String,
    options: Options,
    created_at: DateTime<Utc>,
}

impl TcpListener {
    /// Build a TCP listener from an option map.
    ///
    /// `Interface` and `Port` are validated when present. A missing `Name`
    /// falls back to a generated one.
    pub fn new(options: &Options) -> Result<Self, ListenerError> {
        if let Some(raw) = options.get(OPT_PROTOCOL) {
            match raw.parse::<Protocol>() {
                Ok(Protocol::Tcp) => {}
                Ok(other) => return Err(ListenerError::WrongFamily(other)),
                Err(e) => {
                    return Err(ListenerError::InvalidOption {
                        key: OPT_PROTOCOL,
                        value: raw.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        validate_endpoint(options)?;

        let id = ListenerId::new();
        let name = options
            .get(OPT_NAME)
            .cloned()
            .unwrap_or_else(|| format!("tcp-{}", &id.to_string()[..8]));

        Ok(Self {
            id,
            name,
            options: options.clone(),
            created_at: Utc::now(),
        })
    }

    /// The full recognized option set for TCP listeners, with defaults.
    pub fn default_options() -> Options {
        Options::from([
            (OPT_NAME.to_string(), "tcp-listener".to_string()),
            (OPT_DESCRIPTION.to_string(), "Raw TCP listener".to_string()),
            (OPT_INTERFACE.to_string(), "127.0.0.1".to_string()),
            (OPT_PORT.to_string(), "4444".to_string()),
            (OPT_PROTOCOL.to_string(), Protocol::Tcp.as_str().to_string()),
        ])
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn set_options(&mut self, options: Options) {
        self.options = options;
    }
}
