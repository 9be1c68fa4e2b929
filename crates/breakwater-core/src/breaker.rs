//! Circuit breaker implementation

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::types::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStatus, CircuitState, InvalidConfig,
};

/// Mutable breaker state. Every transition step (read-state, decide,
/// update-state) runs under one write guard, never held across the
/// wrapped operation's await point.
#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    /// Failure tally in the current monitoring window
    failure_count: u32,
    /// Consecutive probe successes while half-open
    success_count: u32,
    last_failure: Option<Instant>,
    /// Time of the last trip; next probe at `opened_at + open_timeout`
    opened_at: Option<Instant>,
    /// Half-open admissions whose outcome has not been recorded yet
    probes_in_flight: u32,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            opened_at: None,
            probes_in_flight: 0,
        }
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.failure_count = 0;
        self.success_count = 0;
        self.probes_in_flight = 0;
    }
}

/// Outcome of the admission decision for one call
enum Admission {
    Admitted { probe: bool },
    Rejected { retry_after: Option<Duration> },
}

/// Circuit breaker guarding calls to one unreliable dependency.
///
/// Create one breaker per logical dependency and reuse it for the process
/// lifetime. Callers hand their async operation to [`execute`]; the breaker
/// decides whether it runs, observes the outcome, and moves through the
/// closed / open / half-open cycle accordingly. A fresh breaker always
/// starts closed; no state survives a restart.
///
/// [`execute`]: CircuitBreaker::execute
pub struct CircuitBreaker {
    /// Dependency name (for logging and diagnostics)
    name: String,
    /// Configuration, immutable after construction
    config: CircuitBreakerConfig,
    core: RwLock<BreakerCore>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejected: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default config
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: CircuitBreakerConfig::default(),
            core: RwLock::new(BreakerCore::new()),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    /// Create a new circuit breaker with custom config
    pub fn with_config(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Result<Self, InvalidConfig> {
        config.validate()?;
        let mut breaker = Self::new(name);
        breaker.config = config;
        Ok(breaker)
    }

    /// Get the dependency name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state, as of the last recorded transition
    pub async fn state(&self) -> CircuitState {
        self.core.read().await.state
    }

    /// Whether a call made now would be admitted
    pub async fn is_allowed(&self) -> bool {
        let core = self.core.read().await;
        match core.state {
            CircuitState::Closed => true,
            CircuitState::Open => core
                .opened_at
                .is_none_or(|at| at.elapsed() >= self.config.open_timeout),
            CircuitState::HalfOpen => core.probes_in_flight < self.config.max_probe_calls,
        }
    }

    /// Execute an operation under the breaker's protection.
    ///
    /// While closed the operation always runs. While open the call fails
    /// immediately with [`CircuitBreakerError::Open`] until the open timeout
    /// elapses, then the next call is admitted as a probe. The operation's
    /// own error is returned untouched inside
    /// [`CircuitBreakerError::Operation`]; the breaker never retries and
    /// never swallows it.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let probe = match self.admit().await {
            Admission::Rejected { retry_after } => {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(circuit = %self.name, "call rejected while open");
                return Err(CircuitBreakerError::Open {
                    name: self.name.clone(),
                    retry_after,
                });
            }
            Admission::Admitted { probe } => probe,
        };

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        match operation().await {
            Ok(value) => {
                self.on_success(probe).await;
                Ok(value)
            }
            Err(source) => {
                self.on_failure(probe).await;
                Err(CircuitBreakerError::Operation(source))
            }
        }
    }

    /// Decide whether one call may run, applying the open-to-half-open
    /// transition when the open timeout has elapsed.
    async fn admit(&self) -> Admission {
        let mut core = self.core.write().await;
        match core.state {
            CircuitState::Closed => Admission::Admitted { probe: false },
            CircuitState::Open => {
                let elapsed = core.opened_at.map(|at| at.elapsed());
                match elapsed {
                    Some(e) if e < self.config.open_timeout => Admission::Rejected {
                        retry_after: Some(self.config.open_timeout - e),
                    },
                    _ => {
                        core.state = CircuitState::HalfOpen;
                        core.success_count = 0;
                        core.probes_in_flight = 1;
                        tracing::info!(
                            circuit = %self.name,
                            "open timeout elapsed, probing recovery"
                        );
                        Admission::Admitted { probe: true }
                    }
                }
            }
            CircuitState::HalfOpen => {
                if core.probes_in_flight < self.config.max_probe_calls {
                    core.probes_in_flight += 1;
                    Admission::Admitted { probe: true }
                } else {
                    Admission::Rejected { retry_after: None }
                }
            }
        }
    }

    async fn on_success(&self, probe: bool) {
        let mut core = self.core.write().await;
        if probe && core.state == CircuitState::HalfOpen {
            core.probes_in_flight = core.probes_in_flight.saturating_sub(1);
        }
        match core.state {
            CircuitState::Closed => {
                core.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                core.success_count += 1;
                if core.success_count >= self.config.success_threshold {
                    core.state = CircuitState::Closed;
                    core.failure_count = 0;
                    core.success_count = 0;
                    core.opened_at = None;
                    core.probes_in_flight = 0;
                    tracing::info!(circuit = %self.name, "dependency recovered, circuit closed");
                }
            }
            // A reset or manual trip raced the call; its outcome is stale.
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self, probe: bool) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut core = self.core.write().await;
        if probe && core.state == CircuitState::HalfOpen {
            core.probes_in_flight = core.probes_in_flight.saturating_sub(1);
        }
        let now = Instant::now();
        match core.state {
            CircuitState::Closed => {
                // An old tally past the monitoring window collapses to just
                // this failure, so isolated failures never combine to trip.
                let stale = core
                    .last_failure
                    .is_some_and(|at| now.duration_since(at) > self.config.monitoring_window);
                core.failure_count = if stale { 1 } else { core.failure_count + 1 };
                core.last_failure = Some(now);
                if core.failure_count >= self.config.failure_threshold {
                    let failures = core.failure_count;
                    core.trip(now);
                    tracing::error!(
                        circuit = %self.name,
                        failures,
                        "failure threshold exhausted, circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                core.last_failure = Some(now);
                core.trip(now);
                tracing::warn!(circuit = %self.name, "probe failed, circuit reopened");
            }
            CircuitState::Open => {
                core.last_failure = Some(now);
            }
        }
    }

    /// Operator escape hatch: return to closed with all counters zeroed,
    /// without waiting for the open timeout
    pub async fn reset(&self) {
        let mut core = self.core.write().await;
        core.state = CircuitState::Closed;
        core.failure_count = 0;
        core.success_count = 0;
        core.last_failure = None;
        core.opened_at = None;
        core.probes_in_flight = 0;
        tracing::info!(circuit = %self.name, "circuit breaker manually reset");
    }

    /// Operator escape hatch: force the circuit open now
    pub async fn trip(&self) {
        let mut core = self.core.write().await;
        core.trip(Instant::now());
        tracing::warn!(circuit = %self.name, "circuit breaker manually tripped");
    }

    /// Read-only status snapshot for health and diagnostic reporting.
    ///
    /// Never mutates state: a breaker whose open timeout has elapsed still
    /// reports open here until the next call flips it to half-open.
    pub async fn status(&self) -> CircuitBreakerStatus {
        let core = self.core.read().await;
        let now = Instant::now();
        let next_attempt_at = match core.state {
            CircuitState::Open => core
                .opened_at
                .map(|at| instant_to_utc(now, at + self.config.open_timeout)),
            _ => None,
        };
        CircuitBreakerStatus {
            name: self.name.clone(),
            state: core.state,
            failure_count: core.failure_count,
            success_count: core.success_count,
            next_attempt_at,
            last_failure_at: core.last_failure.map(|at| instant_to_utc(now, at)),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Map a monotonic instant onto the wall clock for reporting. Transitions
/// are decided on `Instant`; only status output uses `DateTime<Utc>`.
fn instant_to_utc(now: Instant, at: Instant) -> DateTime<Utc> {
    let wall = Utc::now();
    if at >= now {
        wall + chrono::Duration::from_std(at - now).unwrap_or_else(|_| chrono::Duration::zero())
    } else {
        wall - chrono::Duration::from_std(now - at).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
