//! MetricMonitorActor - one per enabled metric kind
//!
//! ```text
//! fleet snapshot ─► sample healthy instances (≤ P in flight)
//!                 ─► append to history ─► detect ─► dispatch
//!                 ─► truncate history of this kind, evict departed instances
//!                    (every kind's window and dispatch record)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, trace, warn};

use crate::history::Retention;
use crate::monitors::trend;
use crate::{AlertEvent, AlertSource, Instance, MetricKind, Sample};

use super::context::MonitorContext;
use super::messages::TickReport;
use super::ticker::{MonitorActor, TickHandler};

pub type MetricMonitorActor = MonitorActor<KindMonitor>;

/// Tick handler of a single [`MetricKind`]
pub struct KindMonitor {
    kind: MetricKind,
    ctx: Arc<MonitorContext>,
}

impl KindMonitor {
    pub fn new(kind: MetricKind, ctx: Arc<MonitorContext>) -> Self {
        Self { kind, ctx }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Append the sample and run detection over the updated window
    fn record(&self, instance: &Instance, value: f64, now_ms: i64, report: &mut TickReport) {
        let ctx = &self.ctx;

        if let Err(e) = ctx
            .history
            .append(self.kind, &instance.instance_id, Sample::new(value, now_ms))
        {
            warn!("{}: dropping sample: {e:?}", instance.instance_id);
            return;
        }

        let Some(config) = ctx.policy.trend_config(&instance.service_name, self.kind) else {
            return;
        };

        let window = ctx.history.window(self.kind, &instance.instance_id);
        let result = trend::detect(&window, &config);
        trace!("{}: {} over {} samples", instance.instance_id, result.status, window.len());

        if result.is_alert() {
            let outcome = ctx.dispatcher.on(AlertEvent {
                service_name: instance.service_name.clone(),
                instance_id: Some(instance.instance_id.clone()),
                source: AlertSource::Metric(self.kind),
                result,
                at_ms: now_ms,
            });
            report.record_dispatch(outcome);
        }
    }

    fn truncate(&self, fleet: &[Instance], report: &mut TickReport) {
        let ctx = &self.ctx;
        let service_of: HashMap<&str, &str> = fleet
            .iter()
            .map(|i| (i.instance_id.as_str(), i.service_name.as_str()))
            .collect();

        let evicted = ctx.history.truncate_all(
            self.kind,
            ctx.evict_after_missing_ticks,
            |instance_id| match service_of.get(instance_id) {
                Some(service) => ctx
                    .policy
                    .keep_increasing_count(service, self.kind)
                    .map_or(Retention::Unknown, Retention::Keep),
                None => Retention::Unknown,
            },
        );

        if !evicted.is_empty() {
            for instance_id in &evicted {
                ctx.evict_instance(instance_id);
            }
            ctx.counters.instances_evicted(evicted.len());
            report.evicted = evicted;
        }
    }
}

#[async_trait]
impl TickHandler for KindMonitor {
    fn name(&self) -> String {
        self.kind.to_string()
    }

    #[instrument(skip(self), fields(kind = %self.kind))]
    async fn run_tick(&self, now_ms: i64) -> TickReport {
        let ctx = &self.ctx;
        let mut report = TickReport::default();

        let fleet = match ctx.fleet.snapshot().await {
            Ok(fleet) => fleet,
            Err(e) => {
                warn!("skipping tick: {e}");
                ctx.counters.fleet_unavailable();
                report.fleet_unavailable = true;
                return report;
            }
        };

        let kind = self.kind;
        let sampler = ctx.sampler.clone();
        let healthy: Vec<Instance> = fleet.iter().filter(|i| i.healthy).cloned().collect();
        let results: Vec<_> = stream::iter(healthy)
            .map(move |instance| {
                let sampler = sampler.clone();
                async move {
                    let result = sampler.sample(&instance, kind).await;
                    (instance, result)
                }
            })
            .buffer_unordered(ctx.parallelism.max(1))
            .collect()
            .await;

        for (instance, result) in results {
            report.checked += 1;
            match result {
                Ok(value) => {
                    ctx.counters.sample_taken();
                    self.record(&instance, value, now_ms, &mut report);
                }
                Err(e) => {
                    warn!("{}: sample failed: {e}", instance.instance_id);
                    ctx.counters.sample_failed();
                    report.failed += 1;
                }
            }
        }

        self.truncate(&fleet, &mut report);

        debug!(
            "sampled {} instances, {} failed, {} alerts",
            report.checked, report.failed, report.alerts_dispatched
        );
        report
    }
}
