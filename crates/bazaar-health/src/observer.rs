//! Circuit breaker state-change observers

use crate::circuit_breaker::CircuitState;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A single phase transition of one breaker
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    /// Service the breaker guards
    pub service_id: String,
    /// Phase before the transition
    pub from: CircuitState,
    /// Phase after the transition
    pub to: CircuitState,
    /// Consecutive failure count at the time of the transition
    pub consecutive_failures: u32,
    /// When the transition happened
    pub at: DateTime<Utc>,
}

/// Receives breaker phase transitions
///
/// Observers run synchronously on the task that caused the transition, after
/// the breaker has released its internal lock. Keep them cheap.
pub trait StateObserver: Send + Sync {
    /// Called once per transition
    fn on_state_change(&self, transition: &StateTransition);
}

impl<F> StateObserver for F
where
    F: Fn(&StateTransition) + Send + Sync,
{
    fn on_state_change(&self, transition: &StateTransition) {
        self(transition)
    }
}

/// Shared, growable list of observers
#[derive(Clone, Default)]
pub(crate) struct ObserverList {
    inner: Arc<RwLock<Vec<Arc<dyn StateObserver>>>>,
}

impl ObserverList {
    pub(crate) fn push(&self, observer: Arc<dyn StateObserver>) {
        self.inner.write().push(observer);
    }

    pub(crate) fn notify(&self, transition: &StateTransition) {
        // Snapshot so observers may register further observers without deadlocking
        let observers: Vec<_> = self.inner.read().iter().cloned().collect();
        for observer in observers {
            observer.on_state_change(transition);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.len())
            .finish()
    }
}
