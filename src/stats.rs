//! Process-wide counters
//!
//! Nothing in the monitor surfaces errors to users; these counters and the
//! log stream are the only observability.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MonitorCounters {
    ticks_completed: AtomicU64,
    ticks_skipped: AtomicU64,
    samples_taken: AtomicU64,
    sample_errors: AtomicU64,
    fleet_unavailable: AtomicU64,
    alerts_dispatched: AtomicU64,
    alerts_suppressed: AtomicU64,
    notify_successes: AtomicU64,
    notify_failures: AtomicU64,
    forge_errors: AtomicU64,
    instances_evicted: AtomicU64,
}

/// Point-in-time copy of [`MonitorCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub ticks_completed: u64,
    pub ticks_skipped: u64,
    pub samples_taken: u64,
    pub sample_errors: u64,
    pub fleet_unavailable: u64,
    pub alerts_dispatched: u64,
    pub alerts_suppressed: u64,
    pub notify_successes: u64,
    pub notify_failures: u64,
    pub forge_errors: u64,
    pub instances_evicted: u64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl MonitorCounters {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(tick_completed, ticks_completed);
    counter!(tick_skipped, ticks_skipped);
    counter!(sample_taken, samples_taken);
    counter!(sample_failed, sample_errors);
    counter!(fleet_unavailable, fleet_unavailable);
    counter!(alert_dispatched, alerts_dispatched);
    counter!(alert_suppressed, alerts_suppressed);
    counter!(notify_succeeded, notify_successes);
    counter!(notify_failed, notify_failures);
    counter!(forge_failed, forge_errors);

    pub fn instances_evicted(&self, count: usize) {
        self.instances_evicted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MonitorStats {
        MonitorStats {
            ticks_completed: self.ticks_completed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            samples_taken: self.samples_taken.load(Ordering::Relaxed),
            sample_errors: self.sample_errors.load(Ordering::Relaxed),
            fleet_unavailable: self.fleet_unavailable.load(Ordering::Relaxed),
            alerts_dispatched: self.alerts_dispatched.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            notify_successes: self.notify_successes.load(Ordering::Relaxed),
            notify_failures: self.notify_failures.load(Ordering::Relaxed),
            forge_errors: self.forge_errors.load(Ordering::Relaxed),
            instances_evicted: self.instances_evicted.load(Ordering::Relaxed),
        }
    }
}
