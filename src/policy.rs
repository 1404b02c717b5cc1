//! Per-service resolution of detection and dispatch settings
//!
//! Kind-wide settings come from configuration; a service may override any of
//! them. Service definitions are read through the [`FleetView`] on every
//! lookup so a config reload takes effect on the next tick.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::MetricSettings;
use crate::fleet::FleetView;
use crate::monitors::trend::TrendConfig;
use crate::{AlertSource, MetricKind};

pub struct MonitorPolicy {
    fleet: Arc<FleetView>,
    metrics: BTreeMap<MetricKind, MetricSettings>,
    release_suppression_ms: u64,
}

impl MonitorPolicy {
    pub fn new(
        fleet: Arc<FleetView>,
        metrics: BTreeMap<MetricKind, MetricSettings>,
        release_suppression_ms: u64,
    ) -> Self {
        Self {
            fleet,
            metrics,
            release_suppression_ms,
        }
    }

    pub fn enabled_kinds(&self) -> Vec<MetricKind> {
        self.metrics.keys().copied().collect()
    }

    pub fn kind_settings(&self, kind: MetricKind) -> Option<&MetricSettings> {
        self.metrics.get(&kind)
    }

    /// Settings of `kind` as they apply to `service`
    pub fn settings_for(&self, service: &str, kind: MetricKind) -> Option<MetricSettings> {
        let base = self.metrics.get(&kind)?;
        let info = self.fleet.service_info(service);
        Some(base.merged(info.as_ref().and_then(|i| i.metric_overrides.get(&kind))))
    }

    pub fn trend_config(&self, service: &str, kind: MetricKind) -> Option<TrendConfig> {
        self.settings_for(service, kind).map(|settings| TrendConfig::from(&settings))
    }

    /// History retention for an instance of `service`; equals `K`
    pub fn keep_increasing_count(&self, service: &str, kind: MetricKind) -> Option<usize> {
        self.settings_for(service, kind)
            .map(|settings| settings.keep_increasing_count)
    }

    pub fn suppression_ms(&self, service: &str, source: AlertSource) -> u64 {
        match source {
            AlertSource::Metric(kind) => self
                .settings_for(service, kind)
                .map_or(self.release_suppression_ms, |s| s.suppression_ms),
            AlertSource::Release => self.release_suppression_ms,
        }
    }
}
