//! Serializable registry statistics

use bazaar_health::CircuitState;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Liveness of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    /// Last known liveness
    pub healthy: bool,
    /// When the service was last probed
    pub last_health_check_at: Option<DateTime<Utc>>,
}

/// Summary of one registered service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    /// Service id
    pub id: String,
    /// Display name
    pub name: String,
    /// Provenance tag
    pub platform: String,
    /// Route patterns in declaration order
    pub patterns: Vec<String>,
    /// Tracked liveness
    pub health: ServiceHealth,
    /// Breaker phase; closed when no call has gone through the breaker yet
    pub circuit_breaker_state: CircuitState,
}

/// Summary of the whole registry, services in registration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Per-service summaries
    pub services: Vec<ServiceStats>,
    /// Number of registered services
    pub total_services: usize,
    /// Services considered healthy
    pub healthy_count: usize,
    /// Services considered unhealthy
    pub unhealthy_count: usize,
}

impl RegistryStats {
    pub(crate) fn from_services(services: Vec<ServiceStats>) -> Self {
        let healthy_count = services.iter().filter(|s| s.health.healthy).count();
        Self {
            total_services: services.len(),
            unhealthy_count: services.len() - healthy_count,
            healthy_count,
            services,
        }
    }
}
