//! Bounded cache of recent conversion results.
//!
//! Keyed by the full equation (format, content, font). Eviction is FIFO by
//! insertion order, not LRU.

use crate::equation::{ConversionResult, Equation};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Default number of cached results.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<Equation, Arc<ConversionResult>>,
    /// Keys in insertion order, oldest first.
    order: VecDeque<Equation>,
    hits: u64,
    misses: u64,
}

/// Thread-safe FIFO result cache with hit/miss counters.
#[derive(Debug)]
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl ResultCache {
    /// Create a cache holding at most `capacity` results.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity,
        }
    }

    /// Look up a result, counting the hit or miss under the same lock.
    pub fn get(&self, equation: &Equation) -> Option<Arc<ConversionResult>> {
        let mut inner = self.inner.lock();
        let found = inner.entries.get(equation).cloned();
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    /// Store a result, evicting the oldest entry when over capacity.
    pub fn put(&self, equation: Equation, result: Arc<ConversionResult>) {
        let mut inner = self.inner.lock();
        // A re-inserted key counts as newest; keep one queue slot per key.
        if inner.entries.insert(equation.clone(), result).is_some() {
            inner.order.retain(|key| key != &equation);
        }
        inner.order.push_back(equation);
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
    }

    /// `(hits, misses)` so far.
    pub fn counts(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (inner.hits, inner.misses)
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
