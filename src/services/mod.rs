//! Service facades exposed to the operator command layer.

mod listeners;

pub use listeners::{ListenerService, ServiceError};
