//! History Store - bounded per-instance sample windows
//!
//! Windows are partitioned by [`MetricKind`]; each partition has its own lock,
//! so ticks of different kinds never contend. Within a kind the tick handler
//! is the only writer, readers get copies.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::RwLock;

use tracing::{debug, trace};

use crate::{MetricKind, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendError {
    /// The sample is not newer than the last one in the window
    OutOfOrder { last_ms: i64, rejected_ms: i64 },
}

/// How long an instance's window should be, as seen by the current fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Instance is known; keep at most this many samples
    Keep(usize),
    /// Instance is not in the fleet any more
    Unknown,
}

#[derive(Debug, Default)]
struct Window {
    samples: VecDeque<Sample>,
    /// Consecutive truncation cycles the instance was missing from the fleet
    missing_cycles: u32,
}

#[derive(Debug)]
pub struct HistoryStore {
    partitions: BTreeMap<MetricKind, RwLock<HashMap<String, Window>>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            partitions: MetricKind::ALL
                .iter()
                .map(|kind| (*kind, RwLock::new(HashMap::new())))
                .collect(),
        }
    }

    fn partition(&self, kind: MetricKind) -> &RwLock<HashMap<String, Window>> {
        // every kind gets a partition in `new`
        &self.partitions[&kind]
    }

    /// Append a sample; samples must arrive in strictly increasing time order.
    pub fn append(
        &self,
        kind: MetricKind,
        instance_id: &str,
        sample: Sample,
    ) -> Result<usize, AppendError> {
        let mut windows = self.partition(kind).write().unwrap_or_else(|e| e.into_inner());
        let window = windows.entry(instance_id.to_string()).or_default();

        if let Some(last) = window.samples.back() {
            if sample.taken_at_ms <= last.taken_at_ms {
                return Err(AppendError::OutOfOrder {
                    last_ms: last.taken_at_ms,
                    rejected_ms: sample.taken_at_ms,
                });
            }
        }

        window.samples.push_back(sample);
        window.missing_cycles = 0;
        Ok(window.samples.len())
    }

    /// Copy of the window, oldest first. Empty if nothing was recorded.
    pub fn window(&self, kind: MetricKind, instance_id: &str) -> Vec<Sample> {
        self.partition(kind)
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(instance_id)
            .map(|w| w.samples.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, kind: MetricKind, instance_id: &str) -> usize {
        self.partition(kind)
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(instance_id)
            .map_or(0, |w| w.samples.len())
    }

    pub fn instance_ids(&self, kind: MetricKind) -> Vec<String> {
        let mut ids: Vec<String> = self
            .partition(kind)
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Trim every window of `kind` to its retention, dropping oldest first.
    ///
    /// Windows whose instance is [`Retention::Unknown`] for
    /// `evict_after_missing` consecutive cycles are removed entirely. Returns
    /// the ids evicted in this cycle.
    pub fn truncate_all(
        &self,
        kind: MetricKind,
        evict_after_missing: u32,
        retention: impl Fn(&str) -> Retention,
    ) -> Vec<String> {
        let mut windows = self.partition(kind).write().unwrap_or_else(|e| e.into_inner());
        let mut evicted = Vec::new();

        windows.retain(|instance_id, window| match retention(instance_id) {
            Retention::Keep(keep) => {
                window.missing_cycles = 0;
                let excess = window.samples.len().saturating_sub(keep);
                if excess > 0 {
                    window.samples.drain(..excess);
                    trace!("{kind}/{instance_id}: dropped {excess} oldest samples");
                }
                true
            }
            Retention::Unknown => {
                window.missing_cycles += 1;
                if window.missing_cycles >= evict_after_missing {
                    evicted.push(instance_id.clone());
                    false
                } else {
                    true
                }
            }
        });

        if !evicted.is_empty() {
            debug!("{kind}: evicted history of {} departed instances", evicted.len());
        }

        evicted
    }

    /// Remove the windows of every kind for one instance
    pub fn evict_instance(&self, instance_id: &str) {
        for partition in self.partitions.values() {
            partition
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(instance_id);
        }
    }
}
