//! Registry of per-service circuit breakers

use crate::circuit_breaker::{
    BreakerError, BreakerPolicy, BreakerStats, CircuitBreaker, CircuitState,
};
use crate::observer::{ObserverList, StateObserver};
use bazaar_core::{SharedClock, SystemClock};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lazily creates and shares one [`CircuitBreaker`] per service id
///
/// Concurrent `get_or_create` calls for the same id always observe the same
/// instance.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_policy: BreakerPolicy,
    clock: SharedClock,
    observers: ObserverList,
    shutdown: CancellationToken,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerPolicy::default())
    }
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers use `default_policy`
    pub fn new(default_policy: BreakerPolicy) -> Self {
        Self::with_clock(default_policy, SystemClock::shared())
    }

    /// Create a registry driven by `clock`
    pub fn with_clock(default_policy: BreakerPolicy, clock: SharedClock) -> Self {
        Self {
            breakers: DashMap::new(),
            default_policy,
            clock,
            observers: ObserverList::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Policy used for breakers created without an explicit one
    pub fn default_policy(&self) -> &BreakerPolicy {
        &self.default_policy
    }

    /// Breaker for `service_id`, created with the default policy if missing
    pub fn get_or_create(&self, service_id: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(service_id, || self.default_policy.clone())
    }

    /// Breaker for `service_id`, created with `policy()` if missing
    ///
    /// `policy` is ignored when the breaker already exists.
    pub fn get_or_create_with<P>(&self, service_id: &str, policy: P) -> Arc<CircuitBreaker>
    where
        P: FnOnce() -> BreakerPolicy,
    {
        if let Some(existing) = self.breakers.get(service_id) {
            return existing.clone();
        }

        self.breakers
            .entry(service_id.to_string())
            .or_insert_with(|| {
                let policy = policy();
                debug!(service = %service_id, policy = policy.name(), "Creating circuit breaker");
                Arc::new(
                    CircuitBreaker::with_clock(service_id, policy, self.clock.clone())
                        .with_shutdown(self.shutdown.child_token())
                        .with_shared_observers(self.observers.clone()),
                )
            })
            .clone()
    }

    /// Existing breaker for `service_id`
    pub fn get(&self, service_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(service_id).map(|entry| entry.clone())
    }

    /// Run `operation` under the breaker for `service_id`
    pub async fn execute_with_breaker<T, E, F, Fut>(
        &self,
        service_id: &str,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.get_or_create(service_id);
        breaker.execute(operation).await
    }

    /// Observe transitions of every breaker, present and future
    pub fn add_observer(&self, observer: Arc<dyn StateObserver>) {
        self.observers.push(observer);
    }

    /// Stats of every breaker keyed by service id
    pub fn aggregate_stats(&self) -> BTreeMap<String, BreakerStats> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    /// Ids of services whose breaker is closed
    pub fn list_healthy(&self) -> Vec<String> {
        self.ids_where(|state| state == CircuitState::Closed)
    }

    /// Ids of services whose breaker is open or half-open
    pub fn list_unhealthy(&self) -> Vec<String> {
        self.ids_where(|state| state != CircuitState::Closed)
    }

    /// Force one breaker closed; returns whether it existed
    pub fn reset(&self, service_id: &str) -> bool {
        match self.get(service_id) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Force every breaker closed
    pub fn reset_all(&self) {
        for breaker in self.snapshot() {
            breaker.reset();
        }
        info!(count = self.breakers.len(), "All circuit breakers reset");
    }

    /// Cancel every in-flight guarded call
    pub fn shutdown(&self) {
        info!("Cancelling in-flight circuit breaker calls");
        self.shutdown.cancel();
    }

    /// Token cancelled by [`shutdown`](Self::shutdown)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of breakers created so far
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breaker has been created yet
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.iter().map(|entry| entry.value().clone()).collect()
    }

    fn ids_where(&self, keep: impl Fn(CircuitState) -> bool) -> Vec<String> {
        let mut ids: Vec<String> = self
            .snapshot()
            .into_iter()
            .filter(|breaker| keep(breaker.state()))
            .map(|breaker| breaker.service_id().to_string())
            .collect();
        ids.sort();
        ids
    }
}
