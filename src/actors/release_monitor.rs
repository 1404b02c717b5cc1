//! ReleaseMonitorActor - periodic release freshness checks
//!
//! Each tick walks the services that have a forge project and a reminder
//! threshold. A forge failure only affects that service for this tick.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::dispatcher::AlertDispatcher;
use crate::monitors::release::ReleaseFreshnessChecker;
use crate::stats::MonitorCounters;

use super::messages::TickReport;
use super::ticker::{MonitorActor, TickHandler};

pub type ReleaseMonitorActor = MonitorActor<ReleaseMonitor>;

pub struct ReleaseMonitor {
    checker: ReleaseFreshnessChecker,
    dispatcher: Arc<AlertDispatcher>,
    counters: Arc<MonitorCounters>,
}

impl ReleaseMonitor {
    pub fn new(
        checker: ReleaseFreshnessChecker,
        dispatcher: Arc<AlertDispatcher>,
        counters: Arc<MonitorCounters>,
    ) -> Self {
        Self {
            checker,
            dispatcher,
            counters,
        }
    }
}

#[async_trait]
impl TickHandler for ReleaseMonitor {
    fn name(&self) -> String {
        "release_tag".to_string()
    }

    #[instrument(skip(self))]
    async fn run_tick(&self, now_ms: i64) -> TickReport {
        let mut report = TickReport::default();

        for service in self.checker.checked_services() {
            report.checked += 1;
            match self.checker.try_check_at(&service, now_ms).await {
                Ok(Some(event)) => {
                    let outcome = self.dispatcher.on(event);
                    report.record_dispatch(outcome);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("release check of {service} failed: {e}");
                    self.counters.forge_failed();
                    report.failed += 1;
                }
            }
        }

        debug!(
            "checked {} services, {} failed, {} alerts",
            report.checked, report.failed, report.alerts_dispatched
        );
        report
    }
}
