//! Circuit breaker pattern implementation
//!
//! One [`CircuitBreaker`] guards one backend service. Two failure-detection
//! policies are supported, selected at construction:
//!
//! - [`BreakerPolicy::ConsecutiveFailures`]: trips after `failure_threshold`
//!   failures in a row; recovery is measured from the last recorded failure.
//! - [`BreakerPolicy::RollingWindow`]: trips when the failure percentage over
//!   a bucketed rolling window reaches `error_threshold_percentage` once the
//!   window holds `volume_threshold` calls; every call has a hard timeout;
//!   recovery is measured from the moment the circuit opened.
//!
//! ```text
//! Closed   -> Open      policy trip condition met
//! Open     -> HalfOpen  first call after the recovery timeout (lazy)
//! HalfOpen -> Closed    the single probe call succeeds
//! HalfOpen -> Open      the single probe call fails
//! ```
//!
//! Only state transitions are serialized. Calls admitted while closed run
//! in parallel; while half-open exactly one probe is admitted, enforced by an
//! atomic flag that is released when the probe's outcome has been recorded.

use crate::observer::{ObserverList, StateObserver, StateTransition};
use crate::window::{Outcome, RollingWindow, WindowStats};
use bazaar_core::error::BoxError;
use bazaar_core::{Error, SharedClock, SystemClock};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of transitions kept in [`BreakerStats::transitions`]
pub const TRANSITION_HISTORY: usize = 10;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, all requests fail immediately
    Open,
    /// Circuit is half-open, a single probe request is allowed
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Settings for the consecutive-failure policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsecutiveFailureConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,

    /// Time since the last failure before a probe is allowed
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,

    /// Optional hard deadline per call
    #[serde(with = "humantime_serde")]
    pub call_timeout: Option<Duration>,
}

impl Default for ConsecutiveFailureConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            call_timeout: None,
        }
    }
}

/// Settings for the rolling-window policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingWindowConfig {
    /// Hard deadline per call; exceeding it counts as a failure
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Failure percentage (0-100) that trips the breaker
    pub error_threshold_percentage: u8,

    /// Time since opening before a probe is allowed
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,

    /// Length of the rolling window
    #[serde(with = "humantime_serde")]
    pub rolling_count_timeout: Duration,

    /// Number of buckets the window is divided into
    pub rolling_count_buckets: u32,

    /// Minimum calls in the window before the percentage is evaluated
    pub volume_threshold: u32,
}

impl Default for RollingWindowConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            error_threshold_percentage: 50,
            reset_timeout: Duration::from_secs(30),
            rolling_count_timeout: Duration::from_secs(10),
            rolling_count_buckets: 10,
            volume_threshold: 10,
        }
    }
}

/// Failure-detection policy of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BreakerPolicy {
    /// Trip on a run of consecutive failures
    ConsecutiveFailures(ConsecutiveFailureConfig),
    /// Trip on failure percentage over a rolling window
    RollingWindow(RollingWindowConfig),
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        BreakerPolicy::ConsecutiveFailures(ConsecutiveFailureConfig::default())
    }
}

impl BreakerPolicy {
    /// Short policy name used in logs and stats
    pub fn name(&self) -> &'static str {
        match self {
            BreakerPolicy::ConsecutiveFailures(_) => "consecutive_failures",
            BreakerPolicy::RollingWindow(_) => "rolling_window",
        }
    }

    /// Per-call deadline, if any
    pub fn call_timeout(&self) -> Option<Duration> {
        match self {
            BreakerPolicy::ConsecutiveFailures(c) => c.call_timeout,
            BreakerPolicy::RollingWindow(c) => Some(c.timeout),
        }
    }

    /// How long the breaker stays open before admitting a probe
    pub fn recovery_timeout(&self) -> Duration {
        match self {
            BreakerPolicy::ConsecutiveFailures(c) => c.recovery_timeout,
            BreakerPolicy::RollingWindow(c) => c.reset_timeout,
        }
    }

    /// Check that the knobs are usable
    pub fn validate(&self) -> bazaar_core::Result<()> {
        match self {
            BreakerPolicy::ConsecutiveFailures(c) => {
                if c.failure_threshold == 0 {
                    return Err(Error::Config("failure_threshold must be >= 1".to_string()));
                }
                if c.call_timeout == Some(Duration::ZERO) {
                    return Err(Error::Config("call_timeout must be > 0".to_string()));
                }
            }
            BreakerPolicy::RollingWindow(c) => {
                if c.error_threshold_percentage == 0 || c.error_threshold_percentage > 100 {
                    return Err(Error::Config(
                        "error_threshold_percentage must be within 1..=100".to_string(),
                    ));
                }
                if c.timeout.is_zero() {
                    return Err(Error::Config("timeout must be > 0".to_string()));
                }
                if c.rolling_count_buckets == 0 {
                    return Err(Error::Config("rolling_count_buckets must be >= 1".to_string()));
                }
                let window_ms = c.rolling_count_timeout.as_millis();
                let buckets = u128::from(c.rolling_count_buckets);
                if window_ms < buckets || window_ms % buckets != 0 {
                    return Err(Error::Config(format!(
                        "rolling_count_timeout ({:?}) must divide evenly into {} buckets",
                        c.rolling_count_timeout, c.rolling_count_buckets
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Details handed to the fallback when a call is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Service the breaker guards
    pub service_id: String,
    /// Breaker phase at the time of rejection
    pub state: CircuitState,
    /// Time left until a probe may be admitted, when known
    pub retry_after: Option<Duration>,
}

/// Produces the error returned for rejected calls
pub type Fallback = Arc<dyn Fn(&Rejection) -> Error + Send + Sync>;

fn service_unavailable(rejection: &Rejection) -> Error {
    Error::unavailable(rejection.service_id.clone())
}

/// Error returned by [`CircuitBreaker::execute`]
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// Call was not attempted; carries the fallback's error
    #[error(transparent)]
    Rejected(Error),

    /// Call exceeded the policy deadline
    #[error("call to '{service}' timed out after {after:?}")]
    Timeout {
        /// Service id
        service: String,
        /// Deadline that elapsed
        after: Duration,
    },

    /// Call was interrupted by shutdown
    #[error("call to '{service}' cancelled by shutdown")]
    Cancelled {
        /// Service id
        service: String,
    },

    /// The operation itself failed
    #[error("call to '{service}' failed: {source}")]
    Upstream {
        /// Service id
        service: String,
        /// Error returned by the operation
        source: E,
    },
}

impl<E> BreakerError<E> {
    /// Whether the call was rejected without being attempted
    pub fn is_rejected(&self) -> bool {
        matches!(self, BreakerError::Rejected(_))
    }

    /// The operation's own error, if that is what failed
    pub fn into_upstream(self) -> Option<E> {
        match self {
            BreakerError::Upstream { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl<E> From<BreakerError<E>> for Error
where
    E: Into<BoxError>,
{
    fn from(err: BreakerError<E>) -> Self {
        match err {
            BreakerError::Rejected(inner) => inner,
            BreakerError::Timeout { service, after } => Error::Timeout { service, after },
            BreakerError::Cancelled { service } => Error::Cancelled { service },
            BreakerError::Upstream { service, source } => Error::upstream(service, source),
        }
    }
}

/// One entry of the transition history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    /// Phase entered
    pub state: CircuitState,
    /// When it was entered
    pub at: DateTime<Utc>,
    /// Consecutive failure count at that moment
    pub consecutive_failures: u32,
}

/// Point-in-time statistics of one breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    /// Service the breaker guards
    pub service_id: String,
    /// Policy name
    pub policy: &'static str,
    /// Current phase
    pub state: CircuitState,
    /// Every call submitted, rejected ones included
    pub total_requests: u64,
    /// Calls that completed successfully
    pub total_successes: u64,
    /// Calls that failed, timeouts included
    pub total_failures: u64,
    /// Calls that timed out
    pub total_timeouts: u64,
    /// Calls rejected without being attempted
    pub total_rejections: u64,
    /// Failures as a percentage of attempted, completed calls
    pub failure_rate_percent: f64,
    /// Current run of failures
    pub consecutive_failures: u32,
    /// Current run of successes
    pub consecutive_successes: u32,
    /// Wall time of the most recent failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Rolling window totals (rolling-window policy only)
    pub window: Option<WindowStats>,
    /// Last transitions, oldest first
    pub transitions: Vec<TransitionRecord>,
}

/// Mutable state guarded by the breaker lock
#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
    last_failure_wall: Option<DateTime<Utc>>,
    opened_at: Option<Instant>,
    window: Option<RollingWindow>,
    transitions: VecDeque<TransitionRecord>,
}

impl BreakerCore {
    fn new(policy: &BreakerPolicy) -> Self {
        let window = match policy {
            BreakerPolicy::RollingWindow(c) => Some(RollingWindow::new(
                c.rolling_count_timeout,
                c.rolling_count_buckets,
            )),
            BreakerPolicy::ConsecutiveFailures(_) => None,
        };

        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
            last_failure_wall: None,
            opened_at: None,
            window,
            transitions: VecDeque::with_capacity(TRANSITION_HISTORY),
        }
    }

    /// Move to `to`, returning the transition when the phase actually changed
    fn transition_to(
        &mut self,
        to: CircuitState,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Option<(CircuitState, CircuitState, u32)> {
        if self.state == to {
            return None;
        }

        let from = self.state;
        self.state = to;

        match to {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.opened_at = None;
                if let Some(window) = self.window.as_mut() {
                    window.clear();
                }
            }
            CircuitState::Open => {
                self.opened_at = Some(now);
            }
            CircuitState::HalfOpen => {}
        }

        if self.transitions.len() == TRANSITION_HISTORY {
            self.transitions.pop_front();
        }
        self.transitions.push_back(TransitionRecord {
            state: to,
            at: wall,
            consecutive_failures: self.consecutive_failures,
        });

        Some((from, to, self.consecutive_failures))
    }
}

/// Admission ticket for one call
#[derive(Debug)]
enum Permit<'a> {
    /// Regular call while closed
    Normal,
    /// The single half-open probe; releases the probe slot on drop
    Probe(ProbeGuard<'a>),
}

impl Permit<'_> {
    fn is_probe(&self) -> bool {
        matches!(self, Permit::Probe(_))
    }
}

#[derive(Debug)]
struct ProbeGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

enum CallAbort {
    Timeout(Duration),
    Cancelled,
}

/// Circuit breaker guarding a single backend service
pub struct CircuitBreaker {
    service_id: String,
    policy: BreakerPolicy,
    clock: SharedClock,
    core: Mutex<BreakerCore>,
    probe_in_flight: AtomicBool,
    total_requests: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_timeouts: AtomicU64,
    total_rejections: AtomicU64,
    observers: ObserverList,
    shared_observers: Option<ObserverList>,
    fallback: RwLock<Fallback>,
    shutdown: CancellationToken,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service_id", &self.service_id)
            .field("policy", &self.policy.name())
            .field("state", &self.state())
            .field("probe_in_flight", &self.probe_in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker using the system clock
    pub fn new(service_id: impl Into<String>, policy: BreakerPolicy) -> Self {
        Self::with_clock(service_id, policy, SystemClock::shared())
    }

    /// Create a breaker driven by the given clock
    pub fn with_clock(
        service_id: impl Into<String>,
        policy: BreakerPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            core: Mutex::new(BreakerCore::new(&policy)),
            policy,
            clock,
            probe_in_flight: AtomicBool::new(false),
            total_requests: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_timeouts: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
            observers: ObserverList::default(),
            shared_observers: None,
            fallback: RwLock::new(Arc::new(service_unavailable)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Interrupt in-flight calls when `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub(crate) fn with_shared_observers(mut self, observers: ObserverList) -> Self {
        self.shared_observers = Some(observers);
        self
    }

    /// Service this breaker guards
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Configured policy
    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    /// Current phase
    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    /// Register an observer for this breaker's transitions
    pub fn add_observer(&self, observer: Arc<dyn StateObserver>) {
        self.observers.push(observer);
    }

    /// Replace the fallback used for rejected calls
    pub fn set_fallback<F>(&self, fallback: F)
    where
        F: Fn(&Rejection) -> Error + Send + Sync + 'static,
    {
        *self.fallback.write() = Arc::new(fallback);
    }

    /// Run `operation` under the breaker
    ///
    /// When the policy has a call timeout the operation future is dropped
    /// once the deadline passes, which cancels it at its next await point.
    /// Work the operation already handed to another task (a spawned request,
    /// a connection pool) is not recalled.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let permit = match self.try_acquire() {
            Ok(permit) => permit,
            Err(rejection) => {
                self.total_rejections.fetch_add(1, Ordering::Relaxed);
                let fallback = self.fallback.read().clone();
                return Err(BreakerError::Rejected(fallback(&rejection)));
            }
        };

        let is_probe = permit.is_probe();
        let started = Instant::now();
        let outcome = self.run(operation).await;

        // Record before the permit drops so the probe slot frees only after
        // the half-open decision is made.
        let result = match outcome {
            Ok(Ok(value)) => {
                self.on_success(is_probe);
                debug!(
                    service = %self.service_id,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Circuit breaker recorded success"
                );
                Ok(value)
            }
            Ok(Err(source)) => {
                self.on_failure(is_probe, Outcome::Failure);
                Err(BreakerError::Upstream {
                    service: self.service_id.clone(),
                    source,
                })
            }
            Err(CallAbort::Timeout(after)) => {
                self.total_timeouts.fetch_add(1, Ordering::Relaxed);
                self.on_failure(is_probe, Outcome::Timeout);
                Err(BreakerError::Timeout {
                    service: self.service_id.clone(),
                    after,
                })
            }
            Err(CallAbort::Cancelled) => Err(BreakerError::Cancelled {
                service: self.service_id.clone(),
            }),
        };

        drop(permit);
        result
    }

    /// Run `operation`, substituting `on_reject`'s value for rejected calls
    pub async fn execute_with_fallback<T, E, F, Fut, R>(
        &self,
        operation: F,
        on_reject: R,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnOnce(&Error) -> T,
    {
        match self.execute(operation).await {
            Err(BreakerError::Rejected(err)) => Ok(on_reject(&err)),
            other => other,
        }
    }

    /// Force the breaker back to closed
    pub fn reset(&self) {
        let transition = {
            let mut core = self.core.lock();
            core.consecutive_successes = 0;
            core.transition_to(CircuitState::Closed, self.clock.now(), self.clock.wall_time())
        };
        info!(service = %self.service_id, "Circuit breaker reset");
        self.notify(transition);
    }

    /// Current statistics
    pub fn stats(&self) -> BreakerStats {
        let now = self.clock.now();
        let mut core = self.core.lock();

        let successes = self.total_successes.load(Ordering::Relaxed);
        let failures = self.total_failures.load(Ordering::Relaxed);
        let completed = successes + failures;

        BreakerStats {
            service_id: self.service_id.clone(),
            policy: self.policy.name(),
            state: core.state,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_successes: successes,
            total_failures: failures,
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            failure_rate_percent: if completed > 0 {
                failures as f64 * 100.0 / completed as f64
            } else {
                0.0
            },
            consecutive_failures: core.consecutive_failures,
            consecutive_successes: core.consecutive_successes,
            last_failure_at: core.last_failure_wall,
            window: core.window.as_mut().map(|w| w.stats(now)),
            transitions: core.transitions.iter().cloned().collect(),
        }
    }

    fn try_acquire(&self) -> Result<Permit<'_>, Rejection> {
        let now = self.clock.now();
        let mut transition = None;

        let admitted = {
            let mut core = self.core.lock();
            match core.state {
                CircuitState::Closed => Ok(Permit::Normal),
                CircuitState::Open => {
                    let since = match self.policy {
                        BreakerPolicy::ConsecutiveFailures(_) => core.last_failure_at,
                        BreakerPolicy::RollingWindow(_) => core.opened_at,
                    };
                    let elapsed = since.map_or(Duration::MAX, |t| now.saturating_duration_since(t));
                    let wait = self.policy.recovery_timeout();

                    if elapsed < wait {
                        Err(Some(wait - elapsed))
                    } else if let Some(guard) = self.claim_probe() {
                        transition =
                            core.transition_to(CircuitState::HalfOpen, now, self.clock.wall_time());
                        Ok(Permit::Probe(guard))
                    } else {
                        Err(None)
                    }
                }
                CircuitState::HalfOpen => self.claim_probe().map(Permit::Probe).ok_or(None),
            }
        };

        self.notify(transition);

        admitted.map_err(|retry_after| {
            let rejection = Rejection {
                service_id: self.service_id.clone(),
                state: self.state(),
                retry_after,
            };
            debug!(
                service = %self.service_id,
                state = %rejection.state,
                "Circuit breaker rejected call"
            );
            rejection
        })
    }

    fn claim_probe(&self) -> Option<ProbeGuard<'_>> {
        self.probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProbeGuard {
                flag: &self.probe_in_flight,
            })
    }

    async fn run<T, E, F, Fut>(&self, operation: F) -> Result<Result<T, E>, CallAbort>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let call = operation();
        let bounded = async {
            match self.policy.call_timeout() {
                Some(after) => tokio::time::timeout(after, call)
                    .await
                    .map_err(|_| CallAbort::Timeout(after)),
                None => Ok(call.await),
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(CallAbort::Cancelled),
            result = bounded => result,
        }
    }

    fn on_success(&self, is_probe: bool) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();

        let transition = {
            let mut core = self.core.lock();
            core.consecutive_successes = core.consecutive_successes.saturating_add(1);
            match core.state {
                CircuitState::HalfOpen if is_probe => {
                    core.transition_to(CircuitState::Closed, now, self.clock.wall_time())
                }
                CircuitState::Closed => {
                    core.consecutive_failures = 0;
                    if let Some(window) = core.window.as_mut() {
                        window.record(now, Outcome::Success);
                    }
                    None
                }
                // Late result of a call admitted before the circuit opened
                _ => None,
            }
        };

        self.notify(transition);
    }

    fn on_failure(&self, is_probe: bool, outcome: Outcome) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let wall = self.clock.wall_time();

        let transition = {
            let mut core = self.core.lock();
            core.consecutive_failures = core.consecutive_failures.saturating_add(1);
            core.consecutive_successes = 0;
            core.last_failure_at = Some(now);
            core.last_failure_wall = Some(wall);

            match core.state {
                CircuitState::Closed => {
                    let trip = match &self.policy {
                        BreakerPolicy::ConsecutiveFailures(c) => {
                            core.consecutive_failures >= c.failure_threshold
                        }
                        BreakerPolicy::RollingWindow(c) => match core.window.as_mut() {
                            Some(window) => {
                                window.record(now, outcome);
                                let stats = window.stats(now);
                                stats.total() >= c.volume_threshold as u64
                                    && stats.failure_percentage()
                                        >= c.error_threshold_percentage as f64
                            }
                            None => false,
                        },
                    };
                    if trip {
                        core.transition_to(CircuitState::Open, now, wall)
                    } else {
                        None
                    }
                }
                // A failed probe reopens immediately, whatever the policy
                CircuitState::HalfOpen if is_probe => {
                    core.transition_to(CircuitState::Open, now, wall)
                }
                _ => None,
            }
        };

        if matches!(outcome, Outcome::Timeout) {
            warn!(service = %self.service_id, "Circuit breaker recorded timeout");
        } else {
            debug!(service = %self.service_id, "Circuit breaker recorded failure");
        }

        self.notify(transition);
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState, u32)>) {
        let Some((from, to, consecutive_failures)) = transition else {
            return;
        };

        match to {
            CircuitState::Open => warn!(
                service = %self.service_id,
                from = %from,
                consecutive_failures,
                "Circuit breaker transitioned to OPEN"
            ),
            CircuitState::HalfOpen => info!(
                service = %self.service_id,
                "Circuit breaker transitioned to HALF-OPEN"
            ),
            CircuitState::Closed => info!(
                service = %self.service_id,
                from = %from,
                "Circuit breaker transitioned to CLOSED"
            ),
        }

        let event = StateTransition {
            service_id: self.service_id.clone(),
            from,
            to,
            consecutive_failures,
            at: self.clock.wall_time(),
        };
        self.observers.notify(&event);
        if let Some(shared) = &self.shared_observers {
            shared.notify(&event);
        }
    }
}
