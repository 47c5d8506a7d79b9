//! Configuration validation

use crate::types::{HealthConfig, ServiceConfig};
use crate::Config;
use bazaar_core::{Error, Result};
use bazaar_health::BreakerPolicy;
use std::collections::HashSet;
use url::Url;

/// Validate configuration
///
/// Route patterns are deliberately not checked; a bad pattern simply never
/// matches.
pub fn validate_config(config: &Config) -> Result<()> {
    // Validate health settings
    validate_health(&config.gateway.health)?;

    // Validate default breaker policy
    validate_policy("circuit_breaker", &config.circuit_breaker)?;

    // Validate services
    validate_services(&config.services)?;

    // Validate logging
    match config.observability.logging.format.as_str() {
        "text" | "json" => {}
        other => {
            return Err(Error::Config(format!(
                "Invalid log format: {other} (must be text or json)"
            )));
        }
    }

    Ok(())
}

fn validate_health(health: &HealthConfig) -> Result<()> {
    if health.probe_timeout.is_zero() {
        return Err(Error::Config("probe_timeout must be > 0".to_string()));
    }

    if health.unhealthy_ttl.is_zero() {
        return Err(Error::Config("unhealthy_ttl must be > 0".to_string()));
    }

    if health.healthy_ttl <= health.unhealthy_ttl {
        return Err(Error::Config(format!(
            "healthy_ttl ({:?}) must be longer than unhealthy_ttl ({:?})",
            health.healthy_ttl, health.unhealthy_ttl
        )));
    }

    if health.probe_timeout > health.unhealthy_ttl {
        tracing::warn!(
            probe_timeout = ?health.probe_timeout,
            unhealthy_ttl = ?health.unhealthy_ttl,
            "probe_timeout exceeds unhealthy_ttl"
        );
    }

    Ok(())
}

fn validate_policy(context: &str, policy: &BreakerPolicy) -> Result<()> {
    policy
        .validate()
        .map_err(|e| Error::Config(format!("{context}: {e}")))
}

fn validate_services(services: &[ServiceConfig]) -> Result<()> {
    let mut seen = HashSet::new();

    for service in services {
        if service.id.is_empty() {
            return Err(Error::Config("service id cannot be empty".to_string()));
        }

        // Later entries replace earlier ones at registration
        if !seen.insert(service.id.as_str()) {
            tracing::warn!(
                service = %service.id,
                "Duplicate service id, the last definition wins"
            );
        }

        let url = Url::parse(&service.base_url).map_err(|e| {
            Error::Config(format!(
                "service '{}': invalid base_url '{}': {e}",
                service.id, service.base_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(Error::Config(format!(
                "service '{}': base_url must be an absolute http(s) URL",
                service.id
            )));
        }

        if !service.health_path.starts_with('/') {
            return Err(Error::Config(format!(
                "service '{}': health_path must start with '/'",
                service.id
            )));
        }

        if service.patterns.is_empty() {
            tracing::warn!(service = %service.id, "Service has no route patterns");
        }

        if let Some(policy) = &service.circuit_breaker {
            validate_policy(&format!("service '{}' circuit_breaker", service.id), policy)?;
        }
    }

    Ok(())
}
