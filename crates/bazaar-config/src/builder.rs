//! Configuration builder

use crate::types::{Config, HealthConfig, ServiceConfig};
use crate::validator::validate_config;
use bazaar_core::Result;
use bazaar_health::BreakerPolicy;

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set health probe and cache settings
    pub fn health(mut self, health: HealthConfig) -> Self {
        self.config.gateway.health = health;
        self
    }

    /// Set the default circuit breaker policy
    pub fn circuit_breaker(mut self, policy: BreakerPolicy) -> Self {
        self.config.circuit_breaker = policy;
        self
    }

    /// Append a service
    pub fn add_service(mut self, service: ServiceConfig) -> Self {
        self.config.services.push(service);
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<Config> {
        validate_config(&self.config)?;
        Ok(self.config)
    }
}
