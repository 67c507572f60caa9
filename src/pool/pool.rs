//! Renderer pool: font-affine allocation, conversion, status and shutdown.

use super::process::Instance;
use super::protocol;
use super::reaper::Reaper;
use super::spawn::{ProcessSpawner, RendererConfig, Spawner};
use super::state::{Decision, PoolState, Worker};
use crate::cache::{DEFAULT_CACHE_CAPACITY, ResultCache};
use crate::equation::{ConversionResult, DEFAULT_FONT, Equation};
use crate::error::{PoolError, Result};
use crate::telemetry::{
    DEFAULT_DURATION_SAMPLES, DEFAULT_ERROR_CAPACITY, ErrorDetail, PoolStatus, Telemetry,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, trace, warn};

/// Configuration for the renderer pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolConfig {
    /// Upper bound on live renderer instances.
    pub max_instances: usize,
    pub cache_capacity: usize,
    /// Processing-time samples kept for status.
    pub duration_samples: usize,
    /// Distinct errors kept for status.
    pub error_capacity: usize,
    /// How long to wait for each line of a response.
    pub processing_timeout: Duration,
    /// Minimum spacing between instance spawns.
    pub creation_interval: Duration,
    /// How long a request waits for a busy instance of its own font.
    pub same_font_grace: Duration,
    /// How often spare instances are closed. `None` disables this.
    pub reaper_period: Option<Duration>,
    /// Window over which peak concurrency is measured.
    pub idle_window: Duration,
    /// Wait per stderr line when diagnosing a failed instance.
    pub stderr_line_timeout: Duration,
    pub stderr_max_lines: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_instances: default_max_instances(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            duration_samples: DEFAULT_DURATION_SAMPLES,
            error_capacity: DEFAULT_ERROR_CAPACITY,
            processing_timeout: Duration::from_secs(10),
            creation_interval: Duration::from_millis(200),
            same_font_grace: Duration::from_millis(500),
            reaper_period: Some(Duration::from_secs(60)),
            idle_window: Duration::from_secs(120),
            stderr_line_timeout: Duration::from_secs(1),
            stderr_max_lines: 100,
        }
    }
}

/// Half the CPUs, between 1 and 8.
pub fn default_max_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .clamp(1, 8)
}

impl PoolConfig {
    /// Reject settings the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_instances", self.max_instances),
            ("cache_capacity", self.cache_capacity),
            ("duration_samples", self.duration_samples),
            ("error_capacity", self.error_capacity),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(PoolError::Config(format!("{name} must be at least 1")));
            }
        }
        if self.processing_timeout.is_zero() {
            return Err(PoolError::Config(
                "processing_timeout must be greater than zero".to_string(),
            ));
        }
        if self.reaper_period.is_some_and(|p| p.is_zero()) {
            return Err(PoolError::Config(
                "reaper_period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

struct Shared<S: Spawner> {
    spawner: S,
    config: PoolConfig,
    state: Mutex<PoolState<S::Instance>>,
    /// Signalled whenever an instance is released or removed.
    changed: Condvar,
    cache: ResultCache,
    telemetry: Telemetry,
}

/// Pool of renderer processes, each pinned to one font.
///
/// Callers on any number of threads call [`convert`](Self::convert); the pool
/// hands each call an instance of the right font, spawning, reusing or
/// reclaiming instances as needed.
pub struct WorkerPool<S: Spawner = ProcessSpawner> {
    shared: Arc<Shared<S>>,
    reaper: Mutex<Option<Reaper>>,
}

impl WorkerPool<ProcessSpawner> {
    /// Pool of real renderer processes.
    pub fn with_renderer(renderer: RendererConfig, config: PoolConfig) -> Result<Self> {
        Self::new(ProcessSpawner::new(renderer), config)
    }
}

impl<S: Spawner> WorkerPool<S> {
    /// Create a pool. No instance is started until the first request.
    pub fn new(spawner: S, config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::new(config.max_instances)),
            changed: Condvar::new(),
            cache: ResultCache::new(config.cache_capacity),
            telemetry: Telemetry::new(config.duration_samples, config.error_capacity),
            spawner,
            config,
        });

        let reaper = match shared.config.reaper_period {
            Some(period) => {
                let weak = Arc::downgrade(&shared);
                Some(Reaper::start(period, move || match weak.upgrade() {
                    Some(shared) => {
                        shared.shed_spares();
                        true
                    }
                    None => false,
                })?)
            }
            None => None,
        };

        info!(
            max_instances = shared.config.max_instances,
            cache_capacity = shared.config.cache_capacity,
            reaper = reaper.is_some(),
            "Renderer pool ready"
        );

        Ok(Self {
            shared,
            reaper: Mutex::new(reaper),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Convert one equation, serving repeats from the cache.
    ///
    /// A [`PoolError::Transport`] means the instance used was destroyed;
    /// retrying gets a fresh one. A [`PoolError::Conversion`] means the
    /// renderer rejected the equation.
    #[instrument(level = "debug", skip(self, equation), fields(equation = %equation, font = equation.font()))]
    pub fn convert(&self, equation: &Equation) -> Result<Arc<ConversionResult>> {
        let shared = &self.shared;
        if let Some(hit) = shared.cache.get(equation) {
            trace!("Cache hit");
            return Ok(hit);
        }

        let start = Instant::now();
        let mut worker = match shared.acquire(equation.font()) {
            Ok(worker) => worker,
            Err(err) => {
                if err.is_transport() {
                    shared
                        .telemetry
                        .record_error(equation, ErrorDetail::Transport(err.to_string()));
                }
                return Err(err);
            }
        };

        match protocol::exchange(
            worker.instance_mut(),
            equation,
            shared.config.processing_timeout,
        ) {
            Ok(result) => {
                shared.check_in(worker);
                let result = Arc::new(result);
                shared.telemetry.record_duration(equation, start.elapsed());
                shared.cache.put(equation.clone(), Arc::clone(&result));
                Ok(result)
            }
            Err(PoolError::Conversion(message)) => {
                shared.check_in(worker);
                debug!(message = %message, "Renderer rejected equation");
                shared
                    .telemetry
                    .record_error(equation, ErrorDetail::Renderer(message.clone()));
                Err(PoolError::Conversion(message))
            }
            Err(err) => {
                let worker_id = worker.id();
                shared
                    .telemetry
                    .record_error(equation, ErrorDetail::Transport(err.to_string()));
                let stderr = shared.discard(worker);
                let err = err.with_stderr(stderr);
                warn!(worker_id, error = %err, "Renderer failed; instance discarded");
                Err(err)
            }
        }
    }

    /// Check out an instance for `font`, blocking as needed.
    pub fn acquire(&self, font: &str) -> Result<Worker<S::Instance>> {
        self.shared.acquire(font)
    }

    /// Give an instance back. An unhealthy one is closed instead.
    pub fn release(&self, worker: Worker<S::Instance>, healthy: bool) {
        if healthy {
            self.shared.check_in(worker);
        } else {
            self.shared.discard(worker);
        }
    }

    pub fn status(&self) -> PoolStatus {
        let (cache_hits, cache_misses) = self.shared.cache.counts();
        let telemetry = self.shared.telemetry.snapshot();
        let (instances, idle) = {
            let state = self.shared.state.lock();
            (state.live(), state.idle())
        };
        PoolStatus {
            cache_hits,
            cache_misses,
            error_count: telemetry.error_count,
            errors: telemetry.errors,
            recent: telemetry.recent,
            instances,
            idle,
        }
    }

    /// Close idle instances beyond the recent peak. Returns how many closed.
    pub fn shed_spares(&self) -> usize {
        self.shared.shed_spares()
    }

    /// Stop the reaper and close every instance.
    ///
    /// Idle instances close now; busy ones close when released. Later
    /// requests fail with [`PoolError::ShutDown`]. Safe to call twice.
    pub fn shutdown(&self) {
        if let Some(mut reaper) = self.reaper.lock().take() {
            reaper.stop();
        }

        let idle = {
            let mut state = self.shared.state.lock();
            state.shutting_down = true;
            state.drain_available()
        };
        self.shared.changed.notify_all();

        if !idle.is_empty() {
            info!(closing = idle.len(), "Shutting down renderer pool");
        }
        for worker in idle {
            worker.into_instance().close();
        }
    }
}

impl<S: Spawner> Drop for WorkerPool<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: Spawner> Shared<S> {
    fn acquire(&self, font: &str) -> Result<Worker<S::Instance>> {
        let grace_deadline = Instant::now() + self.config.same_font_grace;
        let mut state = self.state.lock();

        loop {
            if state.shutting_down {
                return Err(PoolError::ShutDown);
            }

            let now = Instant::now();
            match state.decide(font, now, grace_deadline, &self.config) {
                Decision::Take(index) => {
                    let worker = state.checkout(index, now);
                    trace!(worker_id = worker.id(), font, busy = state.busy(), "Reusing renderer");
                    return Ok(worker);
                }
                Decision::WaitForSameFont(wait) | Decision::Throttle(wait) => {
                    self.changed.wait_for(&mut state, wait);
                }
                Decision::WaitForRelease => {
                    trace!(font, "Pool full; waiting for a release");
                    self.changed.wait(&mut state);
                }
                Decision::Reclaim(index) => {
                    let victim = state.begin_reclaim(index);
                    debug!(
                        worker_id = victim.id(),
                        from = victim.font(),
                        to = font,
                        "Reclaiming idle renderer"
                    );
                    MutexGuard::unlocked(&mut state, || victim.into_instance().close());
                    state.finish_close();
                    if state.shutting_down {
                        self.changed.notify_all();
                        return Err(PoolError::ShutDown);
                    }
                    return self.spawn_locked(&mut state, font);
                }
                Decision::Spawn => return self.spawn_locked(&mut state, font),
            }
        }
    }

    /// Spawn and admit a new instance; the pool lock is held throughout.
    fn spawn_locked(
        &self,
        state: &mut MutexGuard<'_, PoolState<S::Instance>>,
        font: &str,
    ) -> Result<Worker<S::Instance>> {
        let spawned = self.spawner.spawn(font);
        let now = Instant::now();
        state.mark_created(now);

        match spawned {
            Ok(instance) => {
                let worker = state.admit(font, instance, now);
                debug!(
                    worker_id = worker.id(),
                    font,
                    live = state.live(),
                    "Started renderer"
                );
                Ok(worker)
            }
            Err(err) => {
                warn!(font, error = %err, "Failed to start renderer");
                self.changed.notify_all();
                Err(err)
            }
        }
    }

    fn check_in(&self, worker: Worker<S::Instance>) {
        let mut state = self.state.lock();
        if state.shutting_down {
            state.forget(worker.id());
            drop(state);
            self.changed.notify_all();
            worker.into_instance().close();
            return;
        }
        state.check_in(worker);
        drop(state);
        self.changed.notify_all();
    }

    /// Close a failed instance, returning its captured stderr.
    fn discard(&self, worker: Worker<S::Instance>) -> String {
        let id = worker.id();
        let stderr = worker.into_instance().close_with_stderr(
            self.config.stderr_line_timeout,
            self.config.stderr_max_lines,
        );
        self.state.lock().forget(id);
        self.changed.notify_all();
        stderr
    }

    fn shed_spares(&self) -> usize {
        let spares = {
            let mut state = self.state.lock();
            if state.shutting_down || state.live() <= 1 {
                return 0;
            }
            state.take_spares(Instant::now(), self.config.idle_window, DEFAULT_FONT)
        };
        if spares.is_empty() {
            return 0;
        }

        self.changed.notify_all();
        let closed = spares.len();
        for worker in spares {
            debug!(worker_id = worker.id(), font = worker.font(), "Closing spare renderer");
            worker.into_instance().close();
        }
        info!(closed, "Closed spare renderers");
        closed
    }
}
