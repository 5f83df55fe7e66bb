use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Engine operational counters, per queue name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineMetrics {
    pub jobs_submitted: HashMap<String, u64>,
    pub jobs_started: HashMap<String, u64>,
    /// Jobs whose process finished on its own.
    pub jobs_completed: HashMap<String, u64>,
    /// Jobs whose process could not be created.
    pub jobs_failed_to_start: HashMap<String, u64>,
    pub jobs_cancelled: HashMap<String, u64>,
    pub jobs_timed_out: HashMap<String, u64>,
    /// Jobs whose process ignored every destroy request.
    pub jobs_abandoned: HashMap<String, u64>,
    pub history_evictions: u64,
    pub poll_ticks: u64,
    pub avg_tick_duration: Duration,
    pub last_tick: Option<DateTime<Utc>>,
}

fn bump(map: &mut HashMap<String, u64>, queue: &str, n: u64) {
    if n > 0 {
        *map.entry(queue.to_string()).or_default() += n;
    }
}

impl EngineMetrics {
    pub fn record_submitted(&mut self, queue: &str) {
        bump(&mut self.jobs_submitted, queue, 1);
    }

    pub fn record_advance(&mut self, queue: &str, started: u64, failed: u64) {
        bump(&mut self.jobs_started, queue, started);
        bump(&mut self.jobs_failed_to_start, queue, failed);
    }

    pub fn record_finished(
        &mut self,
        queue: &str,
        completed: u64,
        cancelled: u64,
        timed_out: u64,
        abandoned: u64,
    ) {
        bump(&mut self.jobs_completed, queue, completed);
        bump(&mut self.jobs_cancelled, queue, cancelled);
        bump(&mut self.jobs_timed_out, queue, timed_out);
        bump(&mut self.jobs_abandoned, queue, abandoned);
    }

    pub fn record_cancelled(&mut self, queue: &str) {
        bump(&mut self.jobs_cancelled, queue, 1);
    }

    pub fn record_evictions(&mut self, evicted: usize) {
        self.history_evictions += evicted as u64;
    }

    /// Record one poller tick, keeping a running mean of tick duration.
    pub fn record_tick(&mut self, duration: Duration) {
        self.poll_ticks += 1;
        self.last_tick = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_tick_duration = if self.poll_ticks == 1 {
            duration
        } else {
            let prev = self.avg_tick_duration.as_nanos() as f64;
            let cur = duration.as_nanos() as f64;
            let avg = prev + (cur - prev) / self.poll_ticks as f64;
            Duration::from_nanos(avg as u64)
        };
    }

    pub fn submitted(&self, queue: &str) -> u64 {
        self.jobs_submitted.get(queue).copied().unwrap_or(0)
    }

    pub fn started(&self, queue: &str) -> u64 {
        self.jobs_started.get(queue).copied().unwrap_or(0)
    }

    pub fn cancelled(&self, queue: &str) -> u64 {
        self.jobs_cancelled.get(queue).copied().unwrap_or(0)
    }

    pub fn timed_out(&self, queue: &str) -> u64 {
        self.jobs_timed_out.get(queue).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics() {
        let m = EngineMetrics::default();
        assert_eq!(m.poll_ticks, 0);
        assert_eq!(m.submitted("single"), 0);
        assert!(m.last_tick.is_none());
    }

    #[test]
    fn counters_per_queue() {
        let mut m = EngineMetrics::default();
        m.record_submitted("single");
        m.record_submitted("single");
        m.record_submitted("multi");
        m.record_advance("single", 1, 0);
        m.record_finished("single", 0, 1, 0, 0);

        assert_eq!(m.submitted("single"), 2);
        assert_eq!(m.submitted("multi"), 1);
        assert_eq!(m.started("single"), 1);
        assert_eq!(m.cancelled("single"), 1);
        assert!(!m.jobs_failed_to_start.contains_key("single"));
    }

    #[test]
    fn tick_duration_averages() {
        let mut m = EngineMetrics::default();
        m.record_tick(Duration::from_millis(10));
        m.record_tick(Duration::from_millis(20));

        assert_eq!(m.poll_ticks, 2);
        let avg = m.avg_tick_duration.as_millis();
        assert!((14..=16).contains(&avg), "expected ~15ms, got {}ms", avg);
        assert!(m.last_tick.is_some());
    }
}
