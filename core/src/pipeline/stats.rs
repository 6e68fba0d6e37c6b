//! Throughput counters and per-stage idle tracking for the pipeline.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

#[derive(Debug)]
pub struct PipelineStats {
    events_collected: AtomicU64,
    events_processed: AtomicU64,
    actions_generated: AtomicU64,
    actions_executed: AtomicU64,
    last_collector_active: Mutex<Instant>,
    last_strategy_active: Mutex<Instant>,
    last_executor_active: Mutex<Instant>,
}

/// Counter values for one stats interval.
#[derive(Debug, Clone, Copy)]
pub struct StatsWindow {
    pub events_collected: u64,
    pub events_processed: u64,
    pub actions_generated: u64,
    pub actions_executed: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            events_collected: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            actions_generated: AtomicU64::new(0),
            actions_executed: AtomicU64::new(0),
            last_collector_active: Mutex::new(now),
            last_strategy_active: Mutex::new(now),
            last_executor_active: Mutex::new(now),
        }
    }

    pub fn record_collected(&self) {
        self.events_collected.fetch_add(1, Ordering::Relaxed);
        touch(&self.last_collector_active);
    }

    pub fn record_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        touch(&self.last_strategy_active);
    }

    pub fn record_generated(&self) {
        self.actions_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_executed(&self) {
        self.actions_executed.fetch_add(1, Ordering::Relaxed);
        touch(&self.last_executor_active);
    }

    pub fn actions_executed_total(&self) -> u64 {
        self.actions_executed.load(Ordering::Relaxed)
    }

    /// Drain the window counters, resetting them for the next interval.
    pub fn take_window(&self) -> StatsWindow {
        StatsWindow {
            events_collected: self.events_collected.swap(0, Ordering::Relaxed),
            events_processed: self.events_processed.swap(0, Ordering::Relaxed),
            actions_generated: self.actions_generated.swap(0, Ordering::Relaxed),
            actions_executed: self.actions_executed.swap(0, Ordering::Relaxed),
        }
    }

    /// Idle gaps per stage: (collector, strategy, executor).
    pub fn idle_times(&self) -> (Duration, Duration, Duration) {
        (
            elapsed(&self.last_collector_active),
            elapsed(&self.last_strategy_active),
            elapsed(&self.last_executor_active),
        )
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

fn touch(slot: &Mutex<Instant>) {
    if let Ok(mut guard) = slot.lock() {
        *guard = Instant::now();
    }
}

fn elapsed(slot: &Mutex<Instant>) -> Duration {
    slot.lock().map(|guard| guard.elapsed()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_counters_reset_on_take() {
        let stats = PipelineStats::new();
        stats.record_collected();
        stats.record_collected();
        stats.record_processed();
        stats.record_generated();
        stats.record_executed();

        let window = stats.take_window();
        assert_eq!(window.events_collected, 2);
        assert_eq!(window.events_processed, 1);
        assert_eq!(window.actions_generated, 1);
        assert_eq!(window.actions_executed, 1);

        let next = stats.take_window();
        assert_eq!(next.events_collected, 0);
        assert_eq!(next.actions_executed, 0);
    }

    #[test]
    fn idle_times_reset_on_activity() {
        let stats = PipelineStats::new();
        std::thread::sleep(Duration::from_millis(30));
        let (collector_idle, _, _) = stats.idle_times();
        assert!(collector_idle >= Duration::from_millis(30));

        stats.record_collected();
        let (collector_idle, strategy_idle, _) = stats.idle_times();
        assert!(collector_idle < Duration::from_millis(30));
        assert!(strategy_idle >= Duration::from_millis(30));
    }
}
