//! Minimal stats surface: named counters and sampled gauges.
//!
//! Components receive an [`Arc<StatsRegistry>`] at construction and look up
//! the instruments they own by name. Counters are plain atomics; gauges are
//! closures sampled on read, so they always reflect live state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A monotonically incremented (and explicitly clearable) event counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Increment by one.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset to zero.
    pub fn clear(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    /// Current value.
    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge sampled on demand from a closure over live state.
pub struct Gauge {
    sample: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl Gauge {
    /// Build a gauge from its sampling closure.
    pub fn new(sample: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self {
            sample: Box::new(sample),
        }
    }

    /// Sample the current value.
    pub fn sample(&self) -> u64 {
        (self.sample)()
    }
}

impl std::fmt::Debug for Gauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gauge").field("value", &self.sample()).finish()
    }
}

/// Registry of named counters and gauges.
///
/// Counters are created lazily on first lookup so that readers and writers
/// agree on the same instrument without registration order mattering.
/// Registering a gauge under an existing name replaces it.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    counters: Mutex<HashMap<String, Arc<Counter>>>,
    gauges: Mutex<HashMap<String, Arc<Gauge>>>,
}

impl StatsRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Return the counter registered under `name`, creating it if absent.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        let mut counters = self.counters.lock().expect("stats lock poisoned");
        counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::default()))
            .clone()
    }

    /// Register (or replace) the gauge under `name`.
    pub fn register_gauge(&self, name: &str, sample: impl Fn() -> u64 + Send + Sync + 'static) {
        let mut gauges = self.gauges.lock().expect("stats lock poisoned");
        gauges.insert(name.to_string(), Arc::new(Gauge::new(sample)));
    }

    /// Sample the gauge registered under `name`, if any.
    pub fn gauge(&self, name: &str) -> Option<u64> {
        let gauges = self.gauges.lock().expect("stats lock poisoned");
        gauges.get(name).map(|g| g.sample())
    }
}
