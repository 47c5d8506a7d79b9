//! # Bazaar Router
//!
//! Service registry for the gateway:
//! - Route globs where `*` spans any run of characters, slashes included
//! - First-registered-wins resolution in registration order
//! - Cache-first health refresh with separate healthy and unhealthy TTLs
//! - One circuit breaker per service, feeding back into tracked liveness
//! - JSON-serializable statistics snapshot

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod matcher;
pub mod registry;
pub mod snapshot;

pub use matcher::PathPattern;
pub use registry::{
    RouteMatch, ServiceEntry, ServiceRegistry, ServiceRegistryBuilder, DEFAULT_PROBE_TIMEOUT,
};
pub use snapshot::{RegistryStats, ServiceHealth, ServiceStats};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::matcher::PathPattern;
    pub use crate::registry::{RouteMatch, ServiceEntry, ServiceRegistry};
    pub use crate::snapshot::RegistryStats;
}
