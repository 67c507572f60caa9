//! Background thread that closes spare renderer instances.
//!
//! Wakes once per period and runs the supplied task; the task decides what is
//! spare. Stopping is immediate: the sleep is a receive on a stop channel.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to the running reaper thread. Stops it on drop.
pub struct Reaper {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Start the thread. `task` returns `false` to end the loop.
    pub fn start<F>(period: Duration, task: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let thread = thread::Builder::new()
            .name("renderer-reaper".to_string())
            .spawn(move || reaper_loop(period, stop_rx, task))?;

        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop the thread and wait for it to finish.
    pub fn stop(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("Reaper thread panicked");
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reaper_loop<F: FnMut() -> bool>(period: Duration, stop: Receiver<()>, mut task: F) {
    tracing::debug!(period_ms = period.as_millis() as u64, "Reaper thread started");
    loop {
        match stop.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {
                if !task() {
                    break;
                }
            }
            // Sender dropped (or an explicit stop).
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("Reaper thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_runs_task_each_period() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut reaper = Reaper::start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while runs.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        reaper.stop();
        assert!(runs.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_stop_does_not_wait_for_period() {
        let mut reaper = Reaper::start(Duration::from_secs(3600), || true).unwrap();
        let start = Instant::now();
        reaper.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_task_can_end_loop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut reaper = Reaper::start(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        reaper.stop();
    }
}
