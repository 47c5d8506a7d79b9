//! Configuration types

use bazaar_core::{Result, ServiceDescriptor};
use bazaar_health::{BreakerPolicy, HealthCacheConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Default circuit breaker policy
    #[serde(default)]
    pub circuit_breaker: BreakerPolicy,

    /// Backend services in resolution order
    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    /// Observability
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Descriptors of every configured service, in file order
    pub fn service_descriptors(&self) -> Result<Vec<ServiceDescriptor>> {
        self.services.iter().map(ServiceConfig::descriptor).collect()
    }

    /// Breaker policy for `id`: the service override or the default
    pub fn breaker_policy_for(&self, id: &str) -> &BreakerPolicy {
        self.services
            .iter()
            .rev()
            .find(|s| s.id == id)
            .and_then(|s| s.circuit_breaker.as_ref())
            .unwrap_or(&self.circuit_breaker)
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    /// Health probing and caching
    #[serde(default)]
    pub health: HealthConfig,
}

/// Health probe and cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthConfig {
    /// Deadline for a single probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// How long a healthy result is reused
    #[serde(with = "humantime_serde")]
    pub healthy_ttl: Duration,

    /// How long an unhealthy result is reused
    #[serde(with = "humantime_serde")]
    pub unhealthy_ttl: Duration,

    /// `User-Agent` sent with probes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        let cache = HealthCacheConfig::default();
        Self {
            probe_timeout: Duration::from_secs(5),
            healthy_ttl: cache.healthy_ttl,
            unhealthy_ttl: cache.unhealthy_ttl,
            user_agent: None,
        }
    }
}

impl HealthConfig {
    /// Cache TTLs
    pub fn cache_config(&self) -> HealthCacheConfig {
        HealthCacheConfig {
            healthy_ttl: self.healthy_ttl,
            unhealthy_ttl: self.unhealthy_ttl,
        }
    }
}

/// Backend service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Unique id
    pub id: String,

    /// Display name (defaults to the id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Base URL requests are forwarded to
    pub base_url: String,

    /// Health endpoint path
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Provenance tag
    #[serde(default)]
    pub platform: String,

    /// Route globs in match order
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Static headers attached when forwarding
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Breaker policy override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<BreakerPolicy>,
}

impl ServiceConfig {
    /// Convert into a service descriptor
    pub fn descriptor(&self) -> Result<ServiceDescriptor> {
        let mut builder = ServiceDescriptor::builder(&self.id)
            .base_url(&self.base_url)
            .health_path(&self.health_path)
            .platform(&self.platform)
            .patterns(self.patterns.iter().cloned());

        if let Some(name) = &self.name {
            builder = builder.name(name);
        }
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }

        builder.build()
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Log format (json, text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// Default functions
fn default_health_path() -> String {
    "/health".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_health::ConsecutiveFailureConfig;

    fn service(id: &str) -> ServiceConfig {
        ServiceConfig {
            id: id.to_string(),
            name: None,
            base_url: format!("http://{id}.internal:8080"),
            health_path: default_health_path(),
            platform: "kubernetes".to_string(),
            patterns: vec![format!("/api/v1/{id}/*")],
            headers: BTreeMap::from([("X-Service".to_string(), id.to_string())]),
            circuit_breaker: None,
        }
    }

    #[test]
    fn test_default_values() {
        let health = HealthConfig::default();
        assert_eq!(health.probe_timeout, Duration::from_secs(5));
        assert_eq!(health.healthy_ttl, Duration::from_secs(30));
        assert_eq!(health.unhealthy_ttl, Duration::from_secs(10));
        assert_eq!(default_health_path(), "/health");
        assert_eq!(LoggingConfig::default().level, "info");
    }

    #[test]
    fn test_descriptor_conversion() {
        let descriptor = service("hotels").descriptor().unwrap();
        assert_eq!(descriptor.name, "hotels");
        assert_eq!(descriptor.health_url(), "http://hotels.internal:8080/health");
        assert_eq!(descriptor.headers["X-Service"], "hotels");
        assert_eq!(descriptor.patterns, vec!["/api/v1/hotels/*"]);
    }

    #[test]
    fn test_breaker_policy_override() {
        let override_policy = BreakerPolicy::ConsecutiveFailures(ConsecutiveFailureConfig {
            failure_threshold: 2,
            ..Default::default()
        });
        let mut payments = service("payments");
        payments.circuit_breaker = Some(override_policy.clone());

        let config = Config {
            services: vec![service("hotels"), payments],
            ..Default::default()
        };

        assert_eq!(config.breaker_policy_for("payments"), &override_policy);
        assert_eq!(config.breaker_policy_for("hotels"), &BreakerPolicy::default());
        assert_eq!(config.breaker_policy_for("unknown"), &BreakerPolicy::default());
    }
}
