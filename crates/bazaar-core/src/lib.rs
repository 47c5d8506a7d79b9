//! # Bazaar Core
//!
//! Core types shared by the Bazaar gateway routing core.
//!
//! This crate provides the foundational abstractions used by the registry,
//! the health subsystem and the configuration loader:
//! - Error types and the `Result` alias
//! - A mockable [`Clock`] for every TTL and timeout decision
//! - [`ServiceDescriptor`], the immutable description of a backend service

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod clock;
pub mod error;
pub mod service;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{Error, Result};
pub use service::{ServiceDescriptor, ServiceDescriptorBuilder};

// Re-export commonly used HTTP types
pub use http::StatusCode;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
    pub use crate::error::{Error, Result};
    pub use crate::service::{ServiceDescriptor, ServiceDescriptorBuilder};
}
