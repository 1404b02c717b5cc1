use std::sync::Arc;

use tracing::debug;

use crate::dispatcher::AlertDispatcher;
use crate::fleet::FleetView;
use crate::history::HistoryStore;
use crate::policy::MonitorPolicy;
use crate::sampler::MetricSource;
use crate::stats::MonitorCounters;

/// Collaborators shared by every monitor, wired once at startup
pub struct MonitorContext {
    pub fleet: Arc<FleetView>,
    pub sampler: Arc<dyn MetricSource>,
    pub history: Arc<HistoryStore>,
    pub policy: Arc<MonitorPolicy>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub counters: Arc<MonitorCounters>,
    /// Maximum in-flight sample requests per tick
    pub parallelism: usize,
    pub evict_after_missing_ticks: u32,
}

impl MonitorContext {
    /// Forget an instance that left the fleet: its window of every kind and
    /// all of its dispatch records.
    pub fn evict_instance(&self, instance_id: &str) {
        self.history.evict_instance(instance_id);
        self.dispatcher.forget_instance(instance_id, None);
        debug!("{instance_id}: evicted history and dispatch records");
    }
}
