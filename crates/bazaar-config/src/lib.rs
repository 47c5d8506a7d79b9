//! # Bazaar Configuration
//!
//! Static configuration for the routing core:
//! - Multiple formats (YAML, TOML, JSON)
//! - `${VAR}` / `${VAR:-default}` environment expansion
//! - Validation
//! - Conversion into a ready [`ServiceRegistry`]

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod builder;
pub mod loader;
pub mod types;
pub mod validator;

pub use builder::ConfigBuilder;
pub use loader::{load_config, load_from_file, load_from_str};
pub use types::{
    Config, GatewayConfig, HealthConfig, LoggingConfig, ObservabilityConfig, ServiceConfig,
};
pub use validator::validate_config;

use bazaar_core::{Error, Result, SharedClock, SystemClock};
use bazaar_health::HttpHealthProbe;
use bazaar_router::ServiceRegistry;
use std::path::Path;
use std::sync::Arc;

/// Load configuration from a file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    load_from_file(path)
}

/// Load configuration from a string
pub fn load_str(content: &str, format: ConfigFormat) -> Result<Config> {
    load_from_str(content, format)
}

/// Build a registry holding every configured service
///
/// Services are registered in file order, each with its breaker policy.
pub fn build_registry(config: &Config) -> Result<ServiceRegistry> {
    build_registry_with_clock(config, SystemClock::shared())
}

/// [`build_registry`] driven by `clock`
pub fn build_registry_with_clock(config: &Config, clock: SharedClock) -> Result<ServiceRegistry> {
    let health = &config.gateway.health;

    let mut probe = HttpHealthProbe::new().with_clock(clock.clone());
    if let Some(user_agent) = &health.user_agent {
        probe = probe.with_user_agent(user_agent);
    }

    let registry = ServiceRegistry::builder()
        .clock(clock)
        .probe(Arc::new(probe))
        .probe_timeout(health.probe_timeout)
        .health_cache(health.cache_config())
        .default_policy(config.circuit_breaker.clone())
        .build();

    for service in &config.services {
        let descriptor = service.descriptor()?;
        match &service.circuit_breaker {
            Some(policy) => registry.register_service_with_policy(descriptor, policy.clone()),
            None => registry.register_service(descriptor),
        }
    }

    Ok(registry)
}

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Config("Unable to detect config format".to_string()))?;

        match ext {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(Error::Config(format!("Unsupported config format: {}", ext))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::ManualClock;
    use bazaar_health::{BreakerPolicy, CircuitState};
    use std::path::PathBuf;

    #[test]
    fn test_detect_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("config.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("config.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("config.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("config.json")).unwrap(),
            ConfigFormat::Json
        );
    }

    #[test]
    fn test_unsupported_format() {
        let result = ConfigFormat::from_path(&PathBuf::from("config.txt"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_build_registry_registers_in_file_order() {
        let config = load_str(
            r#"
services:
  - id: catalog
    base_url: "http://catalog.internal"
    patterns: ["/api/v1/shop/*"]
  - id: shop
    base_url: "http://shop.internal"
    patterns: ["/api/v1/shop/*", "/api/v1/cart"]
    circuit_breaker:
      policy: consecutive_failures
      failure_threshold: 1
"#,
            ConfigFormat::Yaml,
        )
        .unwrap();

        let registry = build_registry_with_clock(&config, Arc::new(ManualClock::new())).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("/api/v1/shop/1").unwrap().service_id(), "catalog");
        assert_eq!(registry.resolve("/api/v1/cart").unwrap().service_id(), "shop");

        let _ = registry
            .execute("shop", || async { Err::<(), _>("refused") })
            .await;
        assert_eq!(
            registry.circuit_breaker("shop").unwrap().state(),
            CircuitState::Open
        );
        assert_eq!(
            registry.circuit_breaker("catalog").unwrap().policy().name(),
            "consecutive_failures"
        );
    }

    #[test]
    fn test_later_duplicate_without_override_uses_default_policy() {
        let config = load_str(
            r#"
services:
  - id: shop
    base_url: "http://shop.internal"
    patterns: ["/api/v1/shop/*"]
    circuit_breaker:
      policy: consecutive_failures
      failure_threshold: 1
  - id: shop
    base_url: "http://shop-v2.internal"
    patterns: ["/api/v1/shop/*"]
"#,
            ConfigFormat::Yaml,
        )
        .unwrap();

        let registry = build_registry_with_clock(&config, Arc::new(ManualClock::new())).unwrap();
        let breaker = registry.circuit_breaker("shop").unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(breaker.policy(), config.breaker_policy_for("shop"));
        assert_eq!(breaker.policy(), &BreakerPolicy::default());
    }
}
