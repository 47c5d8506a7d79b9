//! End-to-end tests for the service registry

use async_trait::async_trait;
use bazaar_core::{Error, ManualClock, ServiceDescriptor};
use bazaar_health::{
    BreakerPolicy, CircuitState, ConsecutiveFailureConfig, HealthCheckResult, HealthProbe,
};
use bazaar_router::ServiceRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Probe answering from a table of URL -> healthy, counting calls
#[derive(Debug, Default)]
struct ScriptedProbe {
    answers: Mutex<HashMap<String, bool>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    fn set(&self, url: &str, healthy: bool) {
        self.answers.lock().insert(url.to_string(), healthy);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, url: &str, _timeout: Duration) -> HealthCheckResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answers.lock().get(url).copied() {
            Some(true) => HealthCheckResult::healthy(200, Duration::from_millis(2)),
            Some(false) => HealthCheckResult::unhealthy("Unexpected status code: 503"),
            None => HealthCheckResult::unhealthy("Request error: connection refused"),
        }
    }
}

/// Probe that never answers
#[derive(Debug)]
struct HangingProbe;

#[async_trait]
impl HealthProbe for HangingProbe {
    async fn probe(&self, _url: &str, _timeout: Duration) -> HealthCheckResult {
        std::future::pending().await
    }
}

fn service(id: &str, patterns: &[&str]) -> ServiceDescriptor {
    ServiceDescriptor::builder(id)
        .base_url(format!("http://{id}.internal:8080"))
        .patterns(patterns.iter().copied())
        .build()
        .unwrap()
}

struct Harness {
    clock: Arc<ManualClock>,
    probe: Arc<ScriptedProbe>,
    registry: ServiceRegistry,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new());
    let probe = Arc::new(ScriptedProbe::default());
    let registry = ServiceRegistry::builder()
        .clock(clock.clone())
        .probe(probe.clone())
        .default_policy(BreakerPolicy::ConsecutiveFailures(ConsecutiveFailureConfig {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            call_timeout: None,
        }))
        .build();

    Harness {
        clock,
        probe,
        registry,
    }
}

#[test]
fn test_hotels_glob_spans_segments() {
    let h = harness();
    h.registry
        .register_service(service("hotels", &["/api/v1/hotels/*"]));

    for path in ["/api/v1/hotels/42", "/api/v1/hotels/42/rooms/7"] {
        assert_eq!(h.registry.resolve(path).unwrap().service_id(), "hotels");
    }
    for path in ["/api/v1/hotel/42", "/api/v2/hotels/42"] {
        assert!(matches!(
            h.registry.resolve(path),
            Err(Error::RouteNotFound(p)) if p == path
        ));
    }
}

#[test]
fn test_first_registered_service_wins_overlap() {
    let h = harness();
    h.registry
        .register_service(service("catalog", &["/api/v1/shop/*"]));
    h.registry
        .register_service(service("shop", &["/api/v1/shop/products/*", "/api/v1/cart"]));

    let matched = h.registry.resolve("/api/v1/shop/products/9").unwrap();
    assert_eq!(matched.service_id(), "catalog");
    assert_eq!(matched.pattern, "/api/v1/shop/*");
    assert_eq!(matched.captures, vec!["products/9".to_string()]);

    // Non-overlapping patterns of the later service stay reachable
    assert_eq!(h.registry.resolve("/api/v1/cart").unwrap().service_id(), "shop");
}

#[test]
fn test_patterns_are_tried_in_declaration_order() {
    let h = harness();
    h.registry
        .register_service(service("rides", &["/api/v1/rides/*/track", "/api/v1/rides/*"]));

    let matched = h.registry.resolve("/api/v1/rides/7/track").unwrap();
    assert_eq!(matched.pattern, "/api/v1/rides/*/track");
    assert_eq!(matched.captures, vec!["7".to_string()]);
    assert_eq!(
        matched.upstream_url("/api/v1/rides/7/track"),
        "http://rides.internal:8080/api/v1/rides/7/track"
    );
}

#[test]
fn test_reregistration_replaces_in_place() {
    let h = harness();
    h.registry.register_service(service("feed", &["/api/v1/feed"]));
    h.registry.register_service(service("shop", &["/api/v1/*"]));
    h.registry
        .register_service(service("feed", &["/api/v1/stories/*"]));

    let ids: Vec<_> = h
        .registry
        .list_services()
        .iter()
        .map(|s| s.descriptor.id.clone())
        .collect();
    assert_eq!(ids, vec!["feed", "shop"]);

    // Old pattern is gone, new one resolves ahead of the catch-all
    assert_eq!(h.registry.resolve("/api/v1/feed").unwrap().service_id(), "shop");
    assert_eq!(
        h.registry.resolve("/api/v1/stories/3").unwrap().service_id(),
        "feed"
    );
}

#[tokio::test]
async fn test_reregistration_starts_with_fresh_liveness() {
    let h = harness();
    h.registry.register_service(service("feed", &["/api/v1/feed"]));
    assert!(!h.registry.refresh_health("feed").await.unwrap().healthy);
    assert!(!h.registry.get_service("feed").unwrap().healthy);

    let moved = ServiceDescriptor::builder("feed")
        .base_url("http://feed-v2.internal:8080")
        .pattern("/api/v1/feed")
        .build()
        .unwrap();
    h.registry.register_service(moved);

    let feed = h.registry.get_service("feed").unwrap();
    assert!(feed.healthy);
    assert!(feed.last_health_check_at.is_none());
    assert!(h.registry.health_cache().get("feed").is_none());
    assert!(h.registry.list_unhealthy().is_empty());

    // The new backend is probed rather than served from the old result
    h.probe.set("http://feed-v2.internal:8080/health", true);
    assert!(h.registry.refresh_health("feed").await.unwrap().healthy);
    assert_eq!(h.probe.calls(), 2);
}

#[test]
fn test_invalid_header_is_reported_at_use() {
    let h = harness();
    let descriptor = ServiceDescriptor::builder("payments")
        .base_url("http://payments.internal")
        .pattern("/api/v1/payments/*")
        .header("X-Service", "payments")
        .header("Bad Header", "x")
        .build()
        .unwrap();
    h.registry.register_service(descriptor);

    let matched = h.registry.resolve("/api/v1/payments/1").unwrap();
    assert_eq!(matched.headers().len(), 2);
    assert!(matches!(matched.header_map(), Err(Error::Config(_))));
}

#[tokio::test]
async fn test_healthy_result_is_cached_for_thirty_seconds() {
    let h = harness();
    h.registry.register_service(service("hotels", &["/hotels/*"]));
    h.probe.set("http://hotels.internal:8080/health", true);

    assert!(h.registry.refresh_health("hotels").await.unwrap().healthy);
    h.clock.advance(Duration::from_secs(29));
    assert!(h.registry.refresh_health("hotels").await.unwrap().healthy);
    assert_eq!(h.probe.calls(), 1);

    h.clock.advance(Duration::from_secs(1));
    h.registry.refresh_health("hotels").await.unwrap();
    assert_eq!(h.probe.calls(), 2);
}

#[tokio::test]
async fn test_unhealthy_result_expires_before_healthy_one() {
    let h = harness();
    h.registry.register_service(service("hotels", &["/hotels/*"]));
    h.registry.register_service(service("rides", &["/rides/*"]));
    h.probe.set("http://hotels.internal:8080/health", true);
    h.probe.set("http://rides.internal:8080/health", false);

    h.registry.refresh_health("hotels").await.unwrap();
    let rides = h.registry.refresh_health("rides").await.unwrap();
    assert!(!rides.healthy);
    assert_eq!(h.probe.calls(), 2);

    // Between the two TTLs: only the unhealthy service is probed again
    h.clock.advance(Duration::from_secs(15));
    h.registry.refresh_health("hotels").await.unwrap();
    h.registry.refresh_health("rides").await.unwrap();
    assert_eq!(h.probe.calls(), 3);
}

#[tokio::test]
async fn test_refresh_updates_tracked_liveness() {
    let h = harness();
    h.registry.register_service(service("shop", &["/shop/*"]));
    h.registry.register_service(service("feed", &["/feed/*"]));
    h.probe.set("http://shop.internal:8080/health", true);

    let before = h.registry.get_service("feed").unwrap();
    assert!(before.healthy);
    assert!(before.last_health_check_at.is_none());

    let results = h.registry.refresh_all_health().await;
    assert_eq!(results.len(), 2);
    assert!(results["shop"].healthy);
    assert!(!results["feed"].healthy);

    let feed = h.registry.get_service("feed").unwrap();
    assert!(!feed.healthy);
    assert!(feed.last_health_check_at.is_some());

    let healthy: Vec<_> = h
        .registry
        .list_healthy()
        .into_iter()
        .map(|s| s.descriptor.id.clone())
        .collect();
    assert_eq!(healthy, vec!["shop"]);
    assert_eq!(h.registry.list_unhealthy().len(), 1);
}

#[tokio::test]
async fn test_unknown_service_is_an_error() {
    let h = harness();
    assert!(matches!(
        h.registry.refresh_health("ghost").await,
        Err(Error::ServiceNotFound(_))
    ));
    assert!(h.registry.circuit_breaker("ghost").is_err());
    assert!(h.registry.get_service("ghost").is_none());
}

#[tokio::test]
async fn test_breaker_transitions_drive_service_health() {
    let h = harness();
    h.registry.register_service(service("payments", &["/pay/*"]));

    for _ in 0..5 {
        let err = h
            .registry
            .execute("payments", || async { Err::<(), _>("connection reset") })
            .await
            .unwrap_err();
        assert!(err.is_breaker_failure());
    }

    let calls = AtomicUsize::new(0);
    let rejected = h
        .registry
        .execute("payments", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(())
        })
        .await
        .unwrap_err();
    assert!(matches!(rejected, Error::ServiceUnavailable { .. }));
    assert_eq!(rejected.to_status_code().as_u16(), 503);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(!h.registry.get_service("payments").unwrap().healthy);
    let stats = h.registry.stats();
    assert_eq!(stats.unhealthy_count, 1);
    assert_eq!(stats.services[0].circuit_breaker_state, CircuitState::Open);

    h.clock.advance(Duration::from_secs(60));
    let value = h
        .registry
        .execute("payments", || async { Ok::<_, std::io::Error>(42) })
        .await
        .unwrap();
    assert_eq!(value, 42);
    assert!(h.registry.get_service("payments").unwrap().healthy);
}

#[tokio::test]
async fn test_per_service_policy_override() {
    let h = harness();
    h.registry.register_service_with_policy(
        service("notifications", &["/notify/*"]),
        BreakerPolicy::ConsecutiveFailures(ConsecutiveFailureConfig {
            failure_threshold: 1,
            ..Default::default()
        }),
    );

    let _ = h
        .registry
        .execute("notifications", || async { Err::<(), _>("boom") })
        .await;

    let breaker = h.registry.circuit_breaker("notifications").unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_reregistration_without_policy_drops_override() {
    let h = harness();
    h.registry.register_service_with_policy(
        service("shop", &["/shop/*"]),
        BreakerPolicy::ConsecutiveFailures(ConsecutiveFailureConfig {
            failure_threshold: 1,
            ..Default::default()
        }),
    );
    h.registry.register_service(service("shop", &["/shop/*"]));

    let _ = h
        .registry
        .execute("shop", || async { Err::<(), _>("boom") })
        .await;

    let breaker = h.registry.circuit_breaker("shop").unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    match breaker.policy() {
        BreakerPolicy::ConsecutiveFailures(c) => assert_eq!(c.failure_threshold, 5),
        other => panic!("unexpected policy {other:?}"),
    }
}

#[tokio::test]
async fn test_stats_snapshot_serializes() {
    let h = harness();
    let descriptor = ServiceDescriptor::builder("hotels")
        .name("Hotel Booking")
        .platform("kubernetes")
        .base_url("http://hotels.internal:8080")
        .pattern("/api/v1/hotels/*")
        .build()
        .unwrap();
    h.registry.register_service(descriptor);

    let json = serde_json::to_value(h.registry.stats()).unwrap();
    assert_eq!(json["total_services"], 1);
    assert_eq!(json["healthy_count"], 1);
    assert_eq!(json["services"][0]["name"], "Hotel Booking");
    assert_eq!(json["services"][0]["platform"], "kubernetes");
    assert_eq!(json["services"][0]["patterns"][0], "/api/v1/hotels/*");
    assert_eq!(json["services"][0]["circuit_breaker_state"], "closed");
}

#[tokio::test]
async fn test_shutdown_interrupts_pending_probe() {
    let registry = Arc::new(
        ServiceRegistry::builder()
            .probe(Arc::new(HangingProbe))
            .build(),
    );
    registry.register_service(service("feed", &["/feed/*"]));

    let task = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.refresh_health("feed").await })
    };
    tokio::task::yield_now().await;
    registry.shutdown();

    let result = task.await.unwrap().unwrap();
    assert!(!result.healthy);
    assert!(registry.health_cache().get("feed").is_none());
    assert!(registry.get_service("feed").unwrap().last_health_check_at.is_none());
}

#[tokio::test]
async fn test_http_probe_against_live_endpoint() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let registry = ServiceRegistry::new();
    registry.register_service(
        ServiceDescriptor::builder("shop")
            .base_url(server.uri())
            .health_path("/status")
            .pattern("/api/v1/shop/*")
            .build()
            .unwrap(),
    );

    assert!(registry.refresh_health("shop").await.unwrap().healthy);
    // Second call is served from cache; the mock expects exactly one hit
    assert!(registry.refresh_health("shop").await.unwrap().healthy);
}
