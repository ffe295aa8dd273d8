//! Elapsed-time display ticker
//!
//! A background tokio task that publishes `now - started_at` on a watch channel at a
//! fixed interval. It only reads the start instant; event capture never goes through
//! it. Dropping the ticker aborts the task.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::trial::clock::Clock;

/// Handle to a running display ticker
#[derive(Debug)]
pub struct ElapsedTicker {
    task: JoinHandle<()>,
    elapsed: watch::Receiver<Duration>,
}

impl ElapsedTicker {
    /// Spawn a ticker on the current tokio runtime.
    ///
    /// Returns `None` when called outside a runtime; the session then simply has no
    /// live display value.
    pub fn spawn(started_at: Instant, clock: Arc<dyn Clock>, interval: Duration) -> Option<Self> {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("no tokio runtime, elapsed display disabled");
                return None;
            }
        };

        let (tx, rx) = watch::channel(Duration::ZERO);
        let task = runtime.spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                let elapsed = clock.now().saturating_duration_since(started_at);
                if tx.send(elapsed).is_err() {
                    break;
                }
            }
        });
        debug!(interval_ms = interval.as_millis() as u64, "elapsed ticker started");

        Some(Self { task, elapsed: rx })
    }

    /// Latest published elapsed time
    pub fn latest(&self) -> Duration {
        *self.elapsed.borrow()
    }

    /// A receiver that is notified on every tick
    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.elapsed.clone()
    }

    /// Stop the ticker
    pub fn cancel(self) {
        // Drop aborts the task
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        self.task.abort();
        debug!("elapsed ticker stopped");
    }
}
