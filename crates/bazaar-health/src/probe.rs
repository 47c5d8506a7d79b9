//! Active health probing of backend services

use async_trait::async_trait;
use bazaar_core::{SharedClock, SystemClock};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{header, Method, Uri};
use http_body_util::Empty;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default `User-Agent` sent with probe requests
pub const DEFAULT_USER_AGENT: &str = concat!("bazaar-gateway/", env!("CARGO_PKG_VERSION"));

/// Outcome of a single health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Whether the service answered with a success status in time
    pub healthy: bool,

    /// HTTP status returned, if any response was received
    pub status_code: Option<u16>,

    /// Round-trip time, if a response was received
    #[serde(default, with = "humantime_serde")]
    pub latency: Option<Duration>,

    /// Failure description
    pub error: Option<String>,

    /// When the probe completed
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    /// A healthy result
    pub fn healthy(status_code: u16, latency: Duration) -> Self {
        Self {
            healthy: true,
            status_code: Some(status_code),
            latency: Some(latency),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// An unhealthy result
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            status_code: None,
            latency: None,
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }

    /// Attach the status code and latency of a response that was not a success
    pub fn with_response(mut self, status_code: u16, latency: Duration) -> Self {
        self.status_code = Some(status_code);
        self.latency = Some(latency);
        self
    }

    /// Override the completion timestamp
    pub fn at(mut self, checked_at: DateTime<Utc>) -> Self {
        self.checked_at = checked_at;
        self
    }
}

/// Checks whether a service is alive
#[async_trait]
pub trait HealthProbe: Send + Sync + fmt::Debug {
    /// Probe `url`, giving up after `timeout`
    ///
    /// Never fails: transport errors and timeouts are reported as unhealthy
    /// results.
    async fn probe(&self, url: &str, timeout: Duration) -> HealthCheckResult;
}

/// Probe issuing `GET <url>` and treating 2xx/3xx as healthy
///
/// Only plain `http://` URLs are supported; there is no TLS connector.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: Client<HttpConnector, Empty<Bytes>>,
    user_agent: String,
    clock: SharedClock,
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpHealthProbe {
    /// Create a probe with the default user agent
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .build_http();

        Self {
            client,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            clock: SystemClock::shared(),
        }
    }

    /// Use a custom `User-Agent`
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Stamp results using `clock`
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str, timeout_duration: Duration) -> HealthCheckResult {
        let start = Instant::now();
        let now = || self.clock.wall_time();

        debug!(url = %url, "Performing HTTP health probe");

        let uri: Uri = match url.parse() {
            Ok(u) => u,
            Err(e) => {
                return HealthCheckResult::unhealthy(format!("Invalid URL: {}", e)).at(now());
            }
        };

        let req = match http::Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::USER_AGENT, &self.user_agent)
            .body(Empty::<Bytes>::new())
        {
            Ok(r) => r,
            Err(e) => {
                return HealthCheckResult::unhealthy(format!("Failed to build request: {}", e))
                    .at(now());
            }
        };

        match timeout(timeout_duration, self.client.request(req)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                let latency = start.elapsed();

                if status.is_success() || status.is_redirection() {
                    debug!(url = %url, status = %status, "Health probe passed");
                    HealthCheckResult::healthy(status.as_u16(), latency).at(now())
                } else {
                    warn!(url = %url, status = %status, "Health probe failed: unexpected status");
                    HealthCheckResult::unhealthy(format!("Unexpected status code: {}", status))
                        .with_response(status.as_u16(), latency)
                        .at(now())
                }
            }
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "Health probe failed: request error");
                HealthCheckResult::unhealthy(format!("Request error: {}", e)).at(now())
            }
            Err(_) => {
                warn!(
                    url = %url,
                    timeout_ms = timeout_duration.as_millis() as u64,
                    "Health probe failed: timeout"
                );
                HealthCheckResult::unhealthy(format!("Timeout after {:?}", timeout_duration))
                    .at(now())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_healthy_on_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .and(header_matcher("user-agent", "bazaar-test"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let probe = HttpHealthProbe::new().with_user_agent("bazaar-test");
        let result = probe
            .probe(&format!("{}/health", server.uri()), Duration::from_secs(2))
            .await;

        assert!(result.healthy);
        assert_eq!(result.status_code, Some(204));
        assert!(result.latency.is_some());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_redirect_counts_as_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/elsewhere"))
            .mount(&server)
            .await;

        let result = HttpHealthProbe::new()
            .probe(&format!("{}/health", server.uri()), Duration::from_secs(2))
            .await;

        assert!(result.healthy);
        assert_eq!(result.status_code, Some(302));
    }

    #[tokio::test]
    async fn test_unhealthy_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = HttpHealthProbe::new()
            .probe(&format!("{}/health", server.uri()), Duration::from_secs(2))
            .await;

        assert!(!result.healthy);
        assert_eq!(result.status_code, Some(503));
        assert!(result.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_unhealthy_on_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let result = HttpHealthProbe::new()
            .probe(&format!("{}/health", server.uri()), Duration::from_millis(50))
            .await;

        assert!(!result.healthy);
        assert!(result.status_code.is_none());
        assert!(result.error.unwrap().starts_with("Timeout"));
    }

    #[tokio::test]
    async fn test_unhealthy_on_invalid_url() {
        let result = HttpHealthProbe::new()
            .probe("not a url", Duration::from_secs(1))
            .await;

        assert!(!result.healthy);
        assert!(result.error.unwrap().starts_with("Invalid URL"));
    }

    #[tokio::test]
    async fn test_unhealthy_on_connection_refused() {
        let server = MockServer::start().await;
        let url = format!("{}/health", server.uri());
        drop(server);

        let result = HttpHealthProbe::new().probe(&url, Duration::from_secs(2)).await;
        assert!(!result.healthy);
    }

    #[test]
    fn test_result_serializes_latency_as_humantime() {
        let result = HealthCheckResult::healthy(200, Duration::from_millis(15));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["latency"], "15ms");
        assert_eq!(json["healthy"], true);
    }
}
