use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::core::Shared;

/// Lets submitters and `end()` cut the poller's sleep short.
pub(super) struct Wakeup {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl Wakeup {
    pub(super) fn new() -> Self {
        Self {
            signalled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(super) fn notify(&self) {
        let mut signalled = self.signalled.lock().unwrap_or_else(PoisonError::into_inner);
        *signalled = true;
        self.cond.notify_one();
    }

    /// Sleep for `timeout` or until notified, whichever comes first.
    pub(super) fn wait(&self, timeout: Duration) {
        let signalled = self.signalled.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut signalled, _) = self
            .cond
            .wait_timeout_while(signalled, timeout, |s| !*s)
            .unwrap_or_else(PoisonError::into_inner);
        *signalled = false;
    }
}

impl Shared {
    /// Run the poll loop. Blocks until the scheduler is closed.
    pub(super) fn run_poller(&self) {
        info!(
            polling_delay_ms = self.config.polling_delay_ms,
            queues = self.queues.len(),
            "Poller starting"
        );

        while self.is_open() {
            let started = Instant::now();
            self.tick();
            if let Ok(mut m) = self.metrics.write() {
                m.record_tick(started.elapsed());
            }
            self.wakeup.wait(self.config.polling_delay());
        }

        info!("Poller stopped");
    }

    /// One poll: fill free slots, reconcile running jobs, trim history.
    pub(super) fn tick(&self) {
        for queue in &self.queues {
            let outcome = queue.advance(self.factory.as_ref());
            if outcome.started + outcome.failed > 0 {
                if let Ok(mut m) = self.metrics.write() {
                    m.record_advance(queue.name(), outcome.started, outcome.failed);
                }
            }
        }

        let now = Instant::now();
        for queue in &self.queues {
            let outcome = queue.reconcile(now, self.config.destroy_attempts);
            if outcome.freed_slots() {
                if let Ok(mut m) = self.metrics.write() {
                    m.record_finished(
                        queue.name(),
                        outcome.completed,
                        outcome.cancelled,
                        outcome.timed_out,
                        outcome.abandoned,
                    );
                }
                // Start the next pending job without waiting a full interval.
                if queue.has_pending() {
                    self.wakeup.notify();
                }
            }
        }

        for queue in &self.queues {
            let evicted = queue.trim_history(self.config.max_history_size);
            if evicted > 0 {
                debug!(queue = queue.name(), evicted, "Trimmed history");
                if let Ok(mut m) = self.metrics.write() {
                    m.record_evictions(evicted);
                }
            }
        }
    }
}
