//! Circuit breaker types and configuration

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, calls proceed normally
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is half-open, limited probes allowed to test recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of failures within the monitoring window before opening
    pub failure_threshold: u32,
    /// Number of consecutive successes in half-open state to close
    pub success_threshold: u32,
    /// Time to stay open before admitting a probe
    #[serde(with = "humantime_serde")]
    pub open_timeout: Duration,
    /// Span after which an old failure tally no longer counts toward tripping
    #[serde(with = "humantime_serde")]
    pub monitoring_window: Duration,
    /// Maximum concurrent probes admitted while half-open
    pub max_probe_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            monitoring_window: Duration::from_secs(120),
            max_probe_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a config that trips early and probes quickly
    pub fn aggressive() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            open_timeout: Duration::from_secs(15),
            monitoring_window: Duration::from_secs(60),
            max_probe_calls: 1,
        }
    }

    /// Create a config that tolerates more failures before tripping
    pub fn lenient() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 5,
            open_timeout: Duration::from_secs(120),
            monitoring_window: Duration::from_secs(300),
            max_probe_calls: 3,
        }
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the success threshold
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the open timeout
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the monitoring window
    pub fn with_monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    /// Set the maximum concurrent probes while half-open
    pub fn with_max_probe_calls(mut self, max: u32) -> Self {
        self.max_probe_calls = max;
        self
    }

    /// Check that all thresholds and durations are usable
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.failure_threshold == 0 {
            return Err(InvalidConfig::ZeroThreshold {
                field: "failure_threshold",
            });
        }
        if self.success_threshold == 0 {
            return Err(InvalidConfig::ZeroThreshold {
                field: "success_threshold",
            });
        }
        if self.max_probe_calls == 0 {
            return Err(InvalidConfig::ZeroThreshold {
                field: "max_probe_calls",
            });
        }
        if self.open_timeout.is_zero() {
            return Err(InvalidConfig::ZeroDuration {
                field: "open_timeout",
            });
        }
        if self.monitoring_window.is_zero() {
            return Err(InvalidConfig::ZeroDuration {
                field: "monitoring_window",
            });
        }
        Ok(())
    }
}

/// Per-dependency breaker configuration, loadable from app config files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Dependency name to breaker configuration
    #[serde(default)]
    pub dependencies: HashMap<String, CircuitBreakerConfig>,
}

/// Rejected configuration value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidConfig {
    /// A threshold field must be a positive integer
    #[error("{field} must be positive")]
    ZeroThreshold { field: &'static str },
    /// A duration field must be non-zero
    #[error("{field} must be a non-zero duration")]
    ZeroDuration { field: &'static str },
}

/// Error from a guarded call
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker rejected the call; the operation was never invoked
    #[error("circuit breaker '{name}' is open")]
    Open {
        /// Name of the protected dependency
        name: String,
        /// Time until the next probe is admitted, if known
        retry_after: Option<Duration>,
    },
    /// The operation ran and failed; the underlying error is untouched
    #[error("operation failed: {0}")]
    Operation(E),
}

impl<E> CircuitBreakerError<E> {
    /// True if the call was rejected without the operation running
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The downstream error, if the operation ran and failed
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Open { .. } => None,
        }
    }
}

/// Read-only snapshot of one circuit breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStatus {
    /// Name of the protected dependency
    pub name: String,
    /// State at the time of the snapshot
    pub state: CircuitState,
    /// Failure tally driving the trip decision
    pub failure_count: u32,
    /// Consecutive probe successes while half-open
    pub success_count: u32,
    /// Wall-clock time before which calls are rejected, while open
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Wall-clock time of the most recent failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Calls admitted over the breaker's lifetime
    pub total_calls: u64,
    /// Admitted calls that failed
    pub total_failures: u64,
    /// Calls rejected without running
    pub total_rejected: u64,
}

impl CircuitBreakerStatus {
    /// Failure rate over all admitted calls, as a percentage
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            (self.total_failures as f64 / self.total_calls as f64) * 100.0
        }
    }
}
