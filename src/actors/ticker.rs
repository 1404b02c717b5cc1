//! MonitorActor - drives one periodic check
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick ─┐
//!             ├─► previous tick still running? ──yes──► skip (ticks_skipped++)
//! TickNow ────┘            │no
//!                          ▼
//!                 spawn tick task ─► TickHandler::run_tick ─► TickReport
//!
//! Shutdown / shutdown signal ─► abort running tick task, exit
//! ```
//!
//! Ticks run on their own task so the actor keeps answering commands and
//! observing the timer while a slow tick is in flight.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, instrument, trace, warn};

use crate::stats::MonitorCounters;
use crate::util::now_ms;

use super::messages::{MonitorCommand, TickOutcome, TickReport};

/// The work done on every tick of a monitor
#[async_trait]
pub trait TickHandler: Send + Sync + 'static {
    /// Name used in logs and to look the monitor up
    fn name(&self) -> String;

    /// Run one tick. Must not fail: every error is handled and logged inside.
    async fn run_tick(&self, now_ms: i64) -> TickReport;
}

pub struct MonitorActor<H: TickHandler> {
    handler: Arc<H>,

    command_rx: mpsc::Receiver<MonitorCommand>,

    shutdown_rx: watch::Receiver<bool>,

    counters: Arc<MonitorCounters>,

    interval_duration: Duration,

    /// Task of the tick currently in flight, if any
    running: Option<JoinHandle<()>>,
}

impl<H: TickHandler> MonitorActor<H> {
    pub fn new(
        handler: Arc<H>,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<MonitorCommand>,
        shutdown_rx: watch::Receiver<bool>,
        counters: Arc<MonitorCounters>,
    ) -> Self {
        Self {
            handler,
            command_rx,
            shutdown_rx,
            counters,
            interval_duration,
            running: None,
        }
    }

    fn ticker(period: Duration) -> tokio::time::Interval {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    fn tick_in_flight(&self) -> bool {
        self.running.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn start_tick(&mut self, respond_to: Option<oneshot::Sender<TickOutcome>>) {
        if self.tick_in_flight() {
            debug!("previous tick still running, skipping");
            self.counters.tick_skipped();
            if let Some(tx) = respond_to {
                let _ = tx.send(TickOutcome::Skipped);
            }
            return;
        }

        let handler = self.handler.clone();
        let counters = self.counters.clone();

        self.running = Some(tokio::spawn(async move {
            let report = handler.run_tick(now_ms()).await;
            counters.tick_completed();
            trace!("{} tick finished: {report:?}", handler.name());
            if let Some(tx) = respond_to {
                let _ = tx.send(TickOutcome::Completed(report));
            }
        }));
    }

    #[instrument(skip(self), fields(monitor = %self.handler.name()))]
    pub async fn run(mut self) {
        debug!("starting monitor actor, interval {:?}", self.interval_duration);

        let mut ticker = Self::ticker(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.start_tick(None),

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        debug!("shutdown signalled");
                        break;
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::TickNow { respond_to } => {
                            debug!("received TickNow command");
                            self.start_tick(Some(respond_to));
                        }

                        MonitorCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = Self::ticker(self.interval_duration);
                        }

                        MonitorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        if let Some(task) = self.running.take() {
            if !task.is_finished() {
                debug!("aborting tick in flight");
                task.abort();
            }
        }

        debug!("monitor actor stopped");
    }
}

/// Handle for controlling a monitor actor
///
/// Cloneable; the actor stops once it is told to or the shutdown signal
/// flips, not when handles are dropped.
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,

    pub name: String,
}

impl MonitorHandle {
    /// Spawn the actor for `handler`; its first tick fires one interval from now
    pub fn spawn<H: TickHandler>(
        handler: H,
        interval_duration: Duration,
        shutdown_rx: watch::Receiver<bool>,
        counters: Arc<MonitorCounters>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let name = handler.name();

        let actor = MonitorActor::new(
            Arc::new(handler),
            interval_duration,
            cmd_rx,
            shutdown_rx,
            counters,
        );

        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            name,
        }
    }

    /// Run a tick now and wait for it to finish
    pub async fn tick_now(&self) -> Result<TickOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::TickNow { respond_to: tx })
            .await
            .context("failed to send TickNow command")?;

        rx.await.context("tick was aborted before completing")
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(MonitorCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MonitorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    /// Resolves once the actor has exited
    pub async fn stopped(&self) {
        self.sender.closed().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }
}
