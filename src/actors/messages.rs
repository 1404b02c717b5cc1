//! Message types for actor communication
//!
//! Every monitor actor accepts the same [`MonitorCommand`]s over an mpsc
//! channel. Queries carry a oneshot `respond_to` sender.

use serde::Serialize;
use tokio::sync::oneshot;

use crate::dispatcher::DispatchOutcome;

/// Commands that can be sent to a monitor actor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Start a tick now, bypassing the interval timer
    ///
    /// Answered once the tick finishes, or right away with
    /// [`TickOutcome::Skipped`] if one is still running.
    TickNow {
        respond_to: oneshot::Sender<TickOutcome>,
    },

    /// Replace the tick interval; the timer restarts from now
    UpdateInterval { interval_secs: u64 },

    /// Stop the actor, aborting a running tick
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),
    /// The previous tick was still running
    Skipped,
}

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Instances sampled or services checked
    pub checked: usize,
    pub failed: usize,
    pub alerts_dispatched: usize,
    pub alerts_suppressed: usize,
    /// Instance ids whose history was dropped this tick
    pub evicted: Vec<String>,
    /// The tick did nothing because the fleet could not be listed
    pub fleet_unavailable: bool,
}

impl TickReport {
    pub(crate) fn record_dispatch(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Dispatched { .. } => self.alerts_dispatched += 1,
            DispatchOutcome::Suppressed { .. } => self.alerts_suppressed += 1,
            DispatchOutcome::Ignored => {}
        }
    }
}
