//! Process-wide mapping from dependency name to circuit breaker.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};

/// Owns one [`CircuitBreaker`] per dependency name.
///
/// Build it once at start-up, configure overrides, then share it behind an
/// `Arc`. A breaker is created the first time its dependency is guarded and
/// is never replaced afterwards, so every saga run calling the same
/// dependency observes the same state.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    default_config: BreakerConfig,
    overrides: HashMap<String, BreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            default_config,
            overrides: HashMap::new(),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Uses `config` instead of the default for `dependency`.
    pub fn with_override(mut self, dependency: impl Into<String>, config: BreakerConfig) -> Self {
        self.overrides.insert(dependency.into(), config);
        self
    }

    /// Returns the breaker for `dependency`, creating it on first use.
    pub fn breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dependency)
        {
            return Arc::clone(existing);
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let breaker = breakers.entry(dependency.to_string()).or_insert_with(|| {
            let config = self
                .overrides
                .get(dependency)
                .cloned()
                .unwrap_or_else(|| self.default_config.clone());
            tracing::debug!(dependency, ?config, "circuit breaker registered");
            CircuitBreaker::with_config(dependency, config)
        });
        Arc::clone(breaker)
    }

    /// Snapshots every registered breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut snapshots: Vec<_> = breakers.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
