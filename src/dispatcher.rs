//! Alert Dispatcher - deduplication, suppression and notifier fan-out
//!
//! ```text
//! AlertEvent ─► status Ok? ──yes──► ignored
//!                  │no
//!                  ▼
//!      last sent for (service, source, instance, status)
//!      less than suppression_ms ago? ──yes──► suppressed
//!                  │no
//!                  ▼
//!      record now, render once, spawn one delivery per notifier
//! ```
//!
//! A failed delivery neither blocks the other notifiers nor rolls back the
//! record, so a broken webhook cannot turn into a notification storm.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, trace};

use crate::formatter::MessageFormatter;
use crate::notifier::Notifier;
use crate::policy::MonitorPolicy;
use crate::stats::MonitorCounters;
use crate::{AlertEvent, AlertSource, CheckStatus};

/// Records idle for longer than this are dropped
pub const DISPATCH_RECORD_IDLE_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    pub service_name: String,
    pub source: AlertSource,
    pub instance_id: Option<String>,
    pub status: CheckStatus,
}

impl DispatchKey {
    pub fn of(event: &AlertEvent) -> Self {
        Self {
            service_name: event.service_name.clone(),
            source: event.source,
            instance_id: event.instance_id.clone(),
            status: event.result.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    pub last_sent_at_ms: i64,
    pub suppression_until_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event carried an `Ok` status
    Ignored,
    /// A notification for the same key went out recently
    Suppressed { until_ms: i64 },
    /// Handed to this many notifiers
    Dispatched { notifiers: usize },
}

pub struct AlertDispatcher {
    policy: Arc<MonitorPolicy>,
    formatter: Arc<dyn MessageFormatter>,
    notifiers: Vec<Arc<dyn Notifier>>,
    records: Mutex<HashMap<DispatchKey, DispatchRecord>>,
    deliveries: Mutex<JoinSet<()>>,
    counters: Arc<MonitorCounters>,
}

impl AlertDispatcher {
    pub fn new(
        policy: Arc<MonitorPolicy>,
        formatter: Arc<dyn MessageFormatter>,
        notifiers: Vec<Arc<dyn Notifier>>,
        counters: Arc<MonitorCounters>,
    ) -> Self {
        Self {
            policy,
            formatter,
            notifiers,
            records: Mutex::new(HashMap::new()),
            deliveries: Mutex::new(JoinSet::new()),
            counters,
        }
    }

    /// Handle one detection. `event.at_ms` is taken as the current time.
    ///
    /// Must be called from within a tokio runtime; deliveries run on spawned tasks.
    #[instrument(skip(self, event), fields(service = %event.service_name, source = %event.source))]
    pub fn on(&self, event: AlertEvent) -> DispatchOutcome {
        if !event.result.is_alert() {
            return DispatchOutcome::Ignored;
        }

        let now = event.at_ms;
        let key = DispatchKey::of(&event);
        let suppression_ms =
            i64::try_from(self.policy.suppression_ms(&event.service_name, event.source))
                .unwrap_or(i64::MAX);

        {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            records.retain(|_, r| {
                now < r.suppression_until_ms || now - r.last_sent_at_ms <= DISPATCH_RECORD_IDLE_MS
            });

            if let Some(record) = records.get(&key) {
                if now - record.last_sent_at_ms < suppression_ms {
                    trace!(
                        "suppressed {} for {:?} until {}",
                        key.status, key.instance_id, record.suppression_until_ms
                    );
                    self.counters.alert_suppressed();
                    return DispatchOutcome::Suppressed {
                        until_ms: record.suppression_until_ms,
                    };
                }
            }

            records.insert(
                key,
                DispatchRecord {
                    last_sent_at_ms: now,
                    suppression_until_ms: now.saturating_add(suppression_ms),
                },
            );
        }

        let message = Arc::new(self.formatter.render(&event));
        info!(
            instance = ?event.instance_id,
            status = %event.result.status,
            observed = event.result.observed,
            "dispatching alert"
        );
        self.counters.alert_dispatched();

        let mut deliveries = self.deliveries.lock().unwrap_or_else(|e| e.into_inner());
        while deliveries.try_join_next().is_some() {}

        for notifier in &self.notifiers {
            let notifier = notifier.clone();
            let message = message.clone();
            let counters = self.counters.clone();

            deliveries.spawn(async move {
                match notifier.send(&message).await {
                    Ok(()) => {
                        debug!("{} delivered alert", notifier.name());
                        counters.notify_succeeded();
                    }
                    Err(e) => {
                        error!("{} failed to deliver alert: {e}", notifier.name());
                        counters.notify_failed();
                    }
                }
            });
        }

        DispatchOutcome::Dispatched {
            notifiers: self.notifiers.len(),
        }
    }

    /// Wait for every delivery spawned so far
    pub async fn flush(&self) {
        let mut pending = std::mem::take(
            &mut *self.deliveries.lock().unwrap_or_else(|e| e.into_inner()),
        );
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                error!("delivery task failed: {e}");
            }
        }
    }

    /// Drop dispatch records of an evicted instance, optionally for one source only
    pub fn forget_instance(&self, instance_id: &str, source: Option<AlertSource>) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|key, _| {
                key.instance_id.as_deref() != Some(instance_id)
                    || source.is_some_and(|s| s != key.source)
            });
    }

    pub fn record(&self, key: &DispatchKey) -> Option<DispatchRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
