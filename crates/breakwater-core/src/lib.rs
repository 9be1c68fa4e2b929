//! Call protection for unreliable downstream dependencies.
//!
//! This crate provides a per-dependency circuit breaker: a small state
//! machine that wraps calls to a database or external service, rejects
//! calls quickly once the dependency is judged unhealthy, and probes for
//! recovery before fully resuming traffic. A registry composes one breaker
//! per dependency for the lifetime of a process.
//!
//! # Example
//! ```
//! use breakwater_core::{CircuitBreaker, CircuitBreakerError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::new("database");
//!
//! let result: Result<u64, CircuitBreakerError<std::io::Error>> =
//!     breaker.execute(|| async { Ok(42) }).await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```

pub mod breaker;
pub mod registry;
pub mod types;


// Re-export all public items
pub use breaker::CircuitBreaker;
pub use registry::{CircuitBreakerRegistry, RegistryBuilder};
pub use types::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStatus, CircuitState, InvalidConfig,
    RegistryConfig,
};
