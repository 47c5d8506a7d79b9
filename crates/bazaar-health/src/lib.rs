//! # Bazaar Health
//!
//! Failure handling for backend services:
//! - Active HTTP health probes
//! - Health result cache with separate healthy and unhealthy TTLs
//! - Circuit breakers with consecutive-failure and rolling-window policies
//! - A registry sharing one breaker per service

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod breaker_registry;
pub mod cache;
pub mod circuit_breaker;
pub mod observer;
pub mod probe;
mod window;

pub use breaker_registry::CircuitBreakerRegistry;
pub use cache::{HealthCache, HealthCacheConfig};
pub use circuit_breaker::{
    BreakerError, BreakerPolicy, BreakerStats, CircuitBreaker, CircuitState,
    ConsecutiveFailureConfig, Fallback, Rejection, RollingWindowConfig, TransitionRecord,
};
pub use observer::{StateObserver, StateTransition};
pub use probe::{HealthCheckResult, HealthProbe, HttpHealthProbe};
pub use window::WindowStats;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::breaker_registry::CircuitBreakerRegistry;
    pub use crate::cache::{HealthCache, HealthCacheConfig};
    pub use crate::circuit_breaker::{
        BreakerError, BreakerPolicy, CircuitBreaker, CircuitState, ConsecutiveFailureConfig,
        RollingWindowConfig,
    };
    pub use crate::observer::{StateObserver, StateTransition};
    pub use crate::probe::{HealthCheckResult, HealthProbe, HttpHealthProbe};
}
