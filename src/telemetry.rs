//! Processing-time samples and deduplicated error tracking.
//!
//! Durations live in a fixed-size ring; errors in a capped list where a
//! repeat of the most recent error (same equation, same message) bumps a
//! counter instead of adding an entry.

use crate::equation::Equation;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Default number of duration samples kept.
pub const DEFAULT_DURATION_SAMPLES: usize = 100;

/// Default number of distinct recent errors kept.
pub const DEFAULT_ERROR_CAPACITY: usize = 100;

/// What went wrong for one tracked error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ErrorDetail {
    /// The renderer reported a problem with the equation.
    Renderer(String),
    /// The renderer process or protocol failed.
    Transport(String),
}

impl ErrorDetail {
    pub fn message(&self) -> &str {
        match self {
            Self::Renderer(msg) | Self::Transport(msg) => msg,
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Renderer(msg) => write!(f, "renderer: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

/// One tracked error, possibly repeated.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub equation: Equation,
    pub detail: ErrorDetail,
    /// When the error first occurred.
    pub at: DateTime<Utc>,
    /// Consecutive occurrences.
    pub count: u32,
}

impl ErrorRecord {
    fn same_as(&self, equation: &Equation, detail: &ErrorDetail) -> bool {
        &self.equation == equation && &self.detail == detail
    }
}

/// Processing time for one converted equation.
#[derive(Debug, Clone, Serialize)]
pub struct DurationSample {
    pub equation: Equation,
    pub millis: u64,
    pub at: DateTime<Utc>,
}

/// Fixed-capacity ring; the oldest slot is overwritten once full.
#[derive(Debug)]
struct Ring<T> {
    slots: Vec<Option<T>>,
    next: usize,
}

impl<T: Clone> Ring<T> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            next: 0,
        }
    }

    fn push(&mut self, value: T) {
        if self.slots.is_empty() {
            return;
        }
        self.slots[self.next] = Some(value);
        self.next = (self.next + 1) % self.slots.len();
    }

    /// Filled slots, newest first.
    fn newest_first(&self) -> Vec<T> {
        let len = self.slots.len();
        (1..=len)
            .filter_map(|back| self.slots[(self.next + len - back) % len].clone())
            .collect()
    }
}

#[derive(Debug)]
struct ErrorLog {
    /// Newest first.
    records: VecDeque<ErrorRecord>,
    total: u64,
}

/// Telemetry for one pool.
#[derive(Debug)]
pub struct Telemetry {
    durations: Mutex<Ring<DurationSample>>,
    errors: Mutex<ErrorLog>,
    error_capacity: usize,
}

/// Telemetry part of a status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    /// Every recorded error, repeats included.
    pub error_count: u64,
    /// Distinct recent errors, newest first.
    pub errors: Vec<ErrorRecord>,
    /// Recent processing times, newest first.
    pub recent: Vec<DurationSample>,
}

/// Everything [`WorkerPool::status`](crate::pool::WorkerPool::status) reports.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub error_count: u64,
    /// Distinct recent errors, newest first.
    pub errors: Vec<ErrorRecord>,
    /// Recent processing times, newest first.
    pub recent: Vec<DurationSample>,
    /// Live renderer instances.
    pub instances: usize,
    /// Live instances not currently checked out.
    pub idle: usize,
}

impl PoolStatus {
    /// Mean of the recent processing times, if any.
    pub fn mean_millis(&self) -> Option<u64> {
        if self.recent.is_empty() {
            return None;
        }
        let total: u64 = self.recent.iter().map(|s| s.millis).sum();
        Some(total / self.recent.len() as u64)
    }
}

impl Telemetry {
    pub fn new(duration_samples: usize, error_capacity: usize) -> Self {
        Self {
            durations: Mutex::new(Ring::new(duration_samples)),
            errors: Mutex::new(ErrorLog {
                records: VecDeque::with_capacity(error_capacity),
                total: 0,
            }),
            error_capacity,
        }
    }

    /// Record how long a conversion took.
    pub fn record_duration(&self, equation: &Equation, elapsed: Duration) {
        let sample = DurationSample {
            equation: equation.clone(),
            millis: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
            at: Utc::now(),
        };
        self.durations.lock().push(sample);
    }

    /// Record an error, folding it into the latest entry when identical.
    pub fn record_error(&self, equation: &Equation, detail: ErrorDetail) {
        let mut log = self.errors.lock();
        log.total += 1;

        if let Some(latest) = log.records.front_mut()
            && latest.same_as(equation, &detail)
        {
            latest.count += 1;
            return;
        }

        log.records.push_front(ErrorRecord {
            equation: equation.clone(),
            detail,
            at: Utc::now(),
            count: 1,
        });
        log.records.truncate(self.error_capacity);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let recent = self.durations.lock().newest_first();
        let log = self.errors.lock();
        TelemetrySnapshot {
            error_count: log.total,
            errors: log.records.iter().cloned().collect(),
            recent,
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(DEFAULT_DURATION_SAMPLES, DEFAULT_ERROR_CAPACITY)
    }
}
