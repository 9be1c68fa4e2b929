//! Registry mapping dependency names to their circuit breakers

use std::collections::HashMap;
use std::sync::Arc;

use crate::breaker::CircuitBreaker;
use crate::types::{CircuitBreakerConfig, CircuitBreakerStatus, InvalidConfig, RegistryConfig};

/// Fixed mapping from dependency name to circuit breaker.
///
/// Built once at process startup with explicit per-dependency configuration
/// and never mutated afterwards, except through each breaker's own
/// [`reset`](CircuitBreaker::reset). Every dependency fails independently: a
/// tripped export-service breaker leaves the database breaker untouched.
pub struct CircuitBreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build a registry from deserialized configuration
    pub fn from_config(config: &RegistryConfig) -> Result<Self, InvalidConfig> {
        let mut builder = Self::builder();
        for (name, breaker_config) in &config.dependencies {
            builder = builder.breaker(name.clone(), breaker_config.clone());
        }
        builder.build()
    }

    /// Get the breaker for a dependency.
    ///
    /// Unknown names return `None` rather than creating a breaker on the
    /// fly; an unregistered dependency is a wiring bug in the caller.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).cloned()
    }

    /// Registered dependency names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// True if no breakers are registered
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Status snapshots for every breaker, sorted by name
    pub async fn status_all(&self) -> Vec<CircuitBreakerStatus> {
        let mut statuses = Vec::with_capacity(self.breakers.len());
        for name in self.names() {
            if let Some(breaker) = self.breakers.get(&name) {
                statuses.push(breaker.status().await);
            }
        }
        statuses
    }

    /// Reset every breaker to closed
    pub async fn reset_all(&self) {
        for breaker in self.breakers.values() {
            breaker.reset().await;
        }
    }
}

/// Builder collecting per-dependency configurations
#[derive(Default)]
pub struct RegistryBuilder {
    configs: Vec<(String, CircuitBreakerConfig)>,
}

impl RegistryBuilder {
    /// Register a dependency with its breaker configuration
    pub fn breaker(mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.configs.push((name.into(), config));
        self
    }

    /// Validate every configuration and build the registry
    pub fn build(self) -> Result<CircuitBreakerRegistry, InvalidConfig> {
        let mut breakers = HashMap::with_capacity(self.configs.len());
        for (name, config) in self.configs {
            let breaker = CircuitBreaker::with_config(name.clone(), config)?;
            breakers.insert(name, Arc::new(breaker));
        }
        Ok(CircuitBreakerRegistry { breakers })
    }
}
