//! Service registry: route resolution, liveness and breakers per service

use crate::matcher::PathPattern;
use crate::snapshot::{RegistryStats, ServiceHealth, ServiceStats};
use bazaar_core::error::BoxError;
use bazaar_core::{Error, Result, ServiceDescriptor, SharedClock, SystemClock};
use bazaar_health::{
    BreakerPolicy, CircuitBreaker, CircuitBreakerRegistry, CircuitState, HealthCache,
    HealthCacheConfig, HealthCheckResult, HealthProbe, HttpHealthProbe, StateTransition,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default deadline for a single health probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a successful [`ServiceRegistry::resolve`]
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// Service owning the matched pattern
    pub service: Arc<ServiceDescriptor>,

    /// Pattern that accepted the path
    pub pattern: String,

    /// Text matched by each `*` of the pattern, in order
    pub captures: Vec<String>,
}

impl RouteMatch {
    /// Id of the matched service
    pub fn service_id(&self) -> &str {
        &self.service.id
    }

    /// URL the request should be forwarded to
    pub fn upstream_url(&self, path: &str) -> String {
        self.service.upstream_url(path)
    }

    /// Static headers configured for the service
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.service.headers
    }

    /// Static headers as an HTTP header map
    pub fn header_map(&self) -> Result<HeaderMap> {
        let id = &self.service.id;
        let mut map = HeaderMap::with_capacity(self.service.headers.len());
        for (name, value) in &self.service.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::Config(format!("service '{id}': invalid header name '{name}': {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                Error::Config(format!("service '{id}': invalid value for header '{name}': {e}"))
            })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

/// Registered service together with its tracked liveness
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    /// Registered descriptor
    pub descriptor: Arc<ServiceDescriptor>,

    /// Last known liveness
    pub healthy: bool,

    /// When the service was last probed
    pub last_health_check_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
struct ServiceStatus {
    healthy: bool,
    last_health_check_at: Option<DateTime<Utc>>,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            healthy: true,
            last_health_check_at: None,
        }
    }
}

#[derive(Debug)]
struct RegisteredService {
    descriptor: Arc<ServiceDescriptor>,
    patterns: Vec<PathPattern>,
    status: RwLock<ServiceStatus>,
}

impl RegisteredService {
    fn new(descriptor: ServiceDescriptor) -> Self {
        let patterns = descriptor.patterns.iter().map(PathPattern::new).collect();
        Self {
            descriptor: Arc::new(descriptor),
            patterns,
            status: RwLock::new(ServiceStatus::default()),
        }
    }

    fn entry(&self) -> ServiceEntry {
        let status = *self.status.read();
        ServiceEntry {
            descriptor: self.descriptor.clone(),
            healthy: status.healthy,
            last_health_check_at: status.last_health_check_at,
        }
    }
}

/// Services in registration order
#[derive(Debug, Default)]
struct ServiceTable {
    services: RwLock<Vec<Arc<RegisteredService>>>,
}

impl ServiceTable {
    fn find(&self, id: &str) -> Option<Arc<RegisteredService>> {
        self.services
            .read()
            .iter()
            .find(|s| s.descriptor.id == id)
            .cloned()
    }

    fn snapshot(&self) -> Vec<Arc<RegisteredService>> {
        self.services.read().clone()
    }

    fn on_breaker_transition(&self, transition: &StateTransition) {
        let healthy = match transition.to {
            CircuitState::Open => false,
            CircuitState::Closed => true,
            CircuitState::HalfOpen => return,
        };

        if let Some(service) = self.find(&transition.service_id) {
            service.status.write().healthy = healthy;
            debug!(
                service = %transition.service_id,
                healthy,
                "Service health updated from circuit breaker"
            );
        }
    }
}

/// Builder for [`ServiceRegistry`]
#[derive(Debug)]
pub struct ServiceRegistryBuilder {
    clock: SharedClock,
    probe: Option<Arc<dyn HealthProbe>>,
    probe_timeout: Duration,
    cache: HealthCacheConfig,
    default_policy: BreakerPolicy,
}

impl Default for ServiceRegistryBuilder {
    fn default() -> Self {
        Self {
            clock: SystemClock::shared(),
            probe: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            cache: HealthCacheConfig::default(),
            default_policy: BreakerPolicy::default(),
        }
    }
}

impl ServiceRegistryBuilder {
    /// Time source for cache expiry and breaker recovery
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Health probe implementation (defaults to [`HttpHealthProbe`])
    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Deadline for a single probe
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Health cache TTLs
    pub fn health_cache(mut self, config: HealthCacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Policy for breakers of services registered without one
    pub fn default_policy(mut self, policy: BreakerPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Build the registry
    pub fn build(self) -> ServiceRegistry {
        let services = Arc::new(ServiceTable::default());
        let breakers =
            CircuitBreakerRegistry::with_clock(self.default_policy, self.clock.clone());

        let table = services.clone();
        breakers.add_observer(Arc::new(move |transition: &StateTransition| {
            table.on_breaker_transition(transition)
        }));

        let probe: Arc<dyn HealthProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(HttpHealthProbe::new().with_clock(self.clock.clone())),
        };

        ServiceRegistry {
            shutdown: breakers.shutdown_token(),
            services,
            health_cache: HealthCache::with_clock(self.cache, self.clock.clone()),
            breakers,
            policies: DashMap::new(),
            probe,
            probe_timeout: self.probe_timeout,
            clock: self.clock,
        }
    }
}

/// Maps request paths to backend services and tracks their liveness
///
/// Resolution walks services in registration order and each service's
/// patterns in declaration order; the first pattern accepting the whole path
/// wins. There is no specificity ranking: when two services declare
/// overlapping patterns the one registered first owns the overlap.
#[derive(Debug)]
pub struct ServiceRegistry {
    services: Arc<ServiceTable>,
    health_cache: HealthCache,
    breakers: CircuitBreakerRegistry,
    policies: DashMap<String, BreakerPolicy>,
    probe: Arc<dyn HealthProbe>,
    probe_timeout: Duration,
    clock: SharedClock,
    shutdown: CancellationToken,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ServiceRegistry {
    /// Create a registry with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a registry
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::default()
    }

    /// Register `descriptor`, replacing any service with the same id
    ///
    /// A replaced service keeps its position in the resolution order only.
    /// Its liveness, cached health and breaker policy override start over.
    /// Patterns are not checked here.
    pub fn register_service(&self, descriptor: ServiceDescriptor) {
        self.insert_service(descriptor, None);
    }

    /// Register `descriptor` with its own breaker policy
    ///
    /// The policy only takes effect if the service's breaker has not been
    /// created yet.
    pub fn register_service_with_policy(
        &self,
        descriptor: ServiceDescriptor,
        policy: BreakerPolicy,
    ) {
        self.insert_service(descriptor, Some(policy));
    }

    fn insert_service(&self, descriptor: ServiceDescriptor, policy: Option<BreakerPolicy>) {
        let id = descriptor.id.clone();
        let patterns = descriptor.patterns.len();

        match policy {
            Some(policy) => {
                self.policies.insert(id.clone(), policy);
            }
            None => {
                self.policies.remove(&id);
            }
        }

        let replaced = {
            let mut services = self.services.services.write();
            let registered = Arc::new(RegisteredService::new(descriptor));
            match services.iter().position(|s| s.descriptor.id == id) {
                Some(index) => {
                    services[index] = registered;
                    true
                }
                None => {
                    services.push(registered);
                    false
                }
            }
        };

        if replaced {
            self.health_cache.invalidate(&id);
            info!(service = %id, patterns, "Service re-registered");
        } else {
            info!(service = %id, patterns, "Service registered");
        }
    }

    /// Find the service owning `path`
    pub fn resolve(&self, path: &str) -> Result<RouteMatch> {
        let services = self.services.services.read();

        for service in services.iter() {
            for pattern in &service.patterns {
                if let Some(captures) = pattern.captures(path) {
                    debug!(
                        path = %path,
                        service = %service.descriptor.id,
                        pattern = %pattern.as_str(),
                        "Route resolved"
                    );
                    return Ok(RouteMatch {
                        service: service.descriptor.clone(),
                        pattern: pattern.as_str().to_string(),
                        captures,
                    });
                }
            }
        }

        debug!(path = %path, "No route matched");
        Err(Error::RouteNotFound(path.to_string()))
    }

    /// Registered service with the given id
    pub fn get_service(&self, id: &str) -> Option<ServiceEntry> {
        self.services.find(id).map(|s| s.entry())
    }

    /// Every service in registration order
    pub fn list_services(&self) -> Vec<ServiceEntry> {
        self.services.snapshot().iter().map(|s| s.entry()).collect()
    }

    /// Services currently considered healthy
    pub fn list_healthy(&self) -> Vec<ServiceEntry> {
        self.list_services().into_iter().filter(|s| s.healthy).collect()
    }

    /// Services currently considered unhealthy
    pub fn list_unhealthy(&self) -> Vec<ServiceEntry> {
        self.list_services().into_iter().filter(|s| !s.healthy).collect()
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.services.read().len()
    }

    /// Whether no service is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Health of `id`, probing only when the cached result has expired
    ///
    /// A failed probe is an unhealthy result, not an error. Errors only for
    /// an unknown id.
    pub async fn refresh_health(&self, id: &str) -> Result<HealthCheckResult> {
        let service = self
            .services
            .find(id)
            .ok_or_else(|| Error::ServiceNotFound(id.to_string()))?;

        if let Some(cached) = self.health_cache.get(id) {
            debug!(service = %id, healthy = cached.healthy, "Health served from cache");
            return Ok(cached);
        }

        let url = service.descriptor.health_url();
        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                warn!(service = %id, "Health probe cancelled by shutdown");
                return Ok(HealthCheckResult::unhealthy("probe cancelled by shutdown")
                    .at(self.clock.wall_time()));
            }
            result = self.probe.probe(&url, self.probe_timeout) => result,
        };

        {
            let mut status = service.status.write();
            status.healthy = result.healthy;
            status.last_health_check_at = Some(result.checked_at);
        }
        self.health_cache.insert(id, result.clone());

        if result.healthy {
            debug!(service = %id, status = ?result.status_code, "Service healthy");
        } else {
            warn!(
                service = %id,
                status = ?result.status_code,
                error = result.error.as_deref().unwrap_or(""),
                "Service unhealthy"
            );
        }

        Ok(result)
    }

    /// Refresh every registered service concurrently
    pub async fn refresh_all_health(&self) -> BTreeMap<String, HealthCheckResult> {
        let ids: Vec<String> = self
            .services
            .snapshot()
            .iter()
            .map(|s| s.descriptor.id.clone())
            .collect();

        let results = join_all(ids.iter().map(|id| self.refresh_health(id))).await;

        ids.into_iter()
            .zip(results)
            .filter_map(|(id, result)| result.ok().map(|r| (id, r)))
            .collect()
    }

    /// Breaker guarding `id`, created on first use
    pub fn circuit_breaker(&self, id: &str) -> Result<Arc<CircuitBreaker>> {
        if self.services.find(id).is_none() {
            return Err(Error::ServiceNotFound(id.to_string()));
        }

        Ok(self.breakers.get_or_create_with(id, || {
            self.policies
                .get(id)
                .map(|p| p.value().clone())
                .unwrap_or_else(|| self.breakers.default_policy().clone())
        }))
    }

    /// Run `operation` against `id` under its breaker
    pub async fn execute<T, E, F, Fut>(&self, id: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let breaker = self.circuit_breaker(id)?;
        breaker.execute(operation).await.map_err(Error::from)
    }

    /// Breakers of all services
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Health result cache
    pub fn health_cache(&self) -> &HealthCache {
        &self.health_cache
    }

    /// Serializable summary of every service
    pub fn stats(&self) -> RegistryStats {
        let services: Vec<ServiceStats> = self
            .services
            .snapshot()
            .iter()
            .map(|s| {
                let status = *s.status.read();
                let descriptor = &s.descriptor;
                ServiceStats {
                    id: descriptor.id.clone(),
                    name: descriptor.name.clone(),
                    platform: descriptor.platform.clone(),
                    patterns: descriptor.patterns.clone(),
                    health: ServiceHealth {
                        healthy: status.healthy,
                        last_health_check_at: status.last_health_check_at,
                    },
                    circuit_breaker_state: self
                        .breakers
                        .get(&descriptor.id)
                        .map_or(CircuitState::Closed, |b| b.state()),
                }
            })
            .collect();

        RegistryStats::from_services(services)
    }

    /// Interrupt in-flight breaker calls and health probes
    pub fn shutdown(&self) {
        info!(services = self.len(), "Shutting down service registry");
        self.breakers.shutdown();
    }
}
