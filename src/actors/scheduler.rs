//! Scheduler - owns every monitor actor and the shutdown signal

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::monitors::release::ReleaseFreshnessChecker;

use super::context::MonitorContext;
use super::metric_monitor::KindMonitor;
use super::release_monitor::ReleaseMonitor;
use super::ticker::MonitorHandle;

/// Release checking, when a forge is configured
pub struct ReleaseSchedule {
    pub checker: ReleaseFreshnessChecker,
    pub interval: Duration,
}

pub struct Scheduler {
    handles: Vec<MonitorHandle>,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    /// Spawn one actor per enabled metric kind, plus the release actor
    pub fn start(ctx: Arc<MonitorContext>, release: Option<ReleaseSchedule>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        for kind in ctx.policy.enabled_kinds() {
            let interval = ctx
                .policy
                .kind_settings(kind)
                .map_or(30, |settings| settings.tick_interval_seconds);

            debug!("scheduling {kind} every {interval}s");
            handles.push(MonitorHandle::spawn(
                KindMonitor::new(kind, ctx.clone()),
                Duration::from_secs(interval),
                shutdown_rx.clone(),
                ctx.counters.clone(),
            ));
        }

        if let Some(release) = release {
            debug!("scheduling release checks every {:?}", release.interval);
            handles.push(MonitorHandle::spawn(
                ReleaseMonitor::new(
                    release.checker,
                    ctx.dispatcher.clone(),
                    ctx.counters.clone(),
                ),
                release.interval,
                shutdown_rx.clone(),
                ctx.counters.clone(),
            ));
        }

        info!("started {} monitors", handles.len());

        Self {
            handles,
            shutdown_tx,
        }
    }

    pub fn handles(&self) -> &[MonitorHandle] {
        &self.handles
    }

    /// Handle of the monitor with this name (`heap_used`, `release_tag`, ...)
    pub fn handle(&self, name: &str) -> Option<&MonitorHandle> {
        self.handles.iter().find(|h| h.name == name)
    }

    /// Signal every actor, abort ticks in flight and wait for all to stop
    pub async fn shutdown(self) {
        if self.shutdown_tx.send(true).is_err() {
            warn!("no monitor was listening for shutdown");
        }

        for handle in &self.handles {
            handle.stopped().await;
            debug!("{} stopped", handle.name);
        }

        info!("scheduler stopped");
    }
}
