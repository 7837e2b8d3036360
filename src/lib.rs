//! Listener management service for an agent command-and-control
//! communications framework.
//!
//! The crate creates, stores, queries, reconfigures, and manages the
//! running state of network listeners across a raw TCP protocol and the
//! HTTP protocol family, behind one uniform service interface:
//!
//! - [`services::ListenerService`]: the facade the operator command layer
//!   talks to
//! - [`listeners`]: listener records and protocol dispatch types
//! - [`servers`]: the infrastructure servers backing HTTP-family listeners
//! - [`store`]: in-memory keyed repositories
//! - [`config`] / [`telemetry`]: daemon configuration and observability

pub mod config;
pub mod listeners;
pub mod servers;
pub mod services;
pub mod store;
pub mod telemetry;
