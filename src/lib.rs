pub mod actors;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fleet;
pub mod formatter;
pub mod history;
pub mod monitors;
pub mod notifier;
pub mod policy;
pub mod sampler;
pub mod stats;
pub mod util;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::MetricOverride;

/// Scalar measurement sampled from every instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    CpuLoad,
    HeapUsed,
    NonHeapUsed,
    ThreadCount,
    GcPauseMs,
    LoadedClasses,
}

/// Where a metric kind lives on the instance's metrics endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Path segment appended to `{endpoint}/metrics/`
    pub metric_id: &'static str,
    /// Statistic picked out of the `measurements` array
    pub statistic: &'static str,
    /// Factor applied to the raw value (e.g. seconds → milliseconds)
    pub scale: f64,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::CpuLoad,
        MetricKind::HeapUsed,
        MetricKind::NonHeapUsed,
        MetricKind::ThreadCount,
        MetricKind::GcPauseMs,
        MetricKind::LoadedClasses,
    ];

    pub fn measurement(self) -> Measurement {
        let (metric_id, statistic, scale) = match self {
            MetricKind::CpuLoad => ("process.cpu.usage", "VALUE", 1.0),
            MetricKind::HeapUsed => ("jvm.memory.used?tag=area:heap", "VALUE", 1.0),
            MetricKind::NonHeapUsed => ("jvm.memory.used?tag=area:nonheap", "VALUE", 1.0),
            MetricKind::ThreadCount => ("jvm.threads.live", "VALUE", 1.0),
            MetricKind::GcPauseMs => ("jvm.gc.pause", "TOTAL_TIME", 1000.0),
            MetricKind::LoadedClasses => ("jvm.classes.loaded", "VALUE", 1.0),
        };

        Measurement {
            metric_id,
            statistic,
            scale,
        }
    }

    pub fn metric_id(self) -> &'static str {
        self.measurement().metric_id
    }

    /// Human readable name used in rendered messages
    pub fn label(self) -> &'static str {
        match self {
            MetricKind::CpuLoad => "CPU load",
            MetricKind::HeapUsed => "Heap used",
            MetricKind::NonHeapUsed => "Non-heap used",
            MetricKind::ThreadCount => "Live threads",
            MetricKind::GcPauseMs => "GC pause time",
            MetricKind::LoadedClasses => "Loaded classes",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            MetricKind::CpuLoad => "",
            MetricKind::HeapUsed | MetricKind::NonHeapUsed => "bytes",
            MetricKind::ThreadCount => "threads",
            MetricKind::GcPauseMs => "ms",
            MetricKind::LoadedClasses => "classes",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::CpuLoad => "cpu_load",
            MetricKind::HeapUsed => "heap_used",
            MetricKind::NonHeapUsed => "non_heap_used",
            MetricKind::ThreadCount => "thread_count",
            MetricKind::GcPauseMs => "gc_pause_ms",
            MetricKind::LoadedClasses => "loaded_classes",
        };
        f.write_str(name)
    }
}

/// One running process of a named service, as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub service_name: String,
    pub metrics_endpoint: String,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

fn default_healthy() -> bool {
    true
}

/// Static per-service settings, replaced only on config reload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceInfo {
    pub name: String,
    pub forge_project_id: Option<u64>,
    pub remind_tag_min_diff_ms: Option<i64>,
    pub metric_overrides: HashMap<MetricKind, MetricOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub value: f64,
    pub taken_at_ms: i64,
}

impl Sample {
    pub fn new(value: f64, taken_at_ms: i64) -> Self {
        Self { value, taken_at_ms }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    SustainedIncrease,
    Threshold,
    StaleRelease,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckStatus::Ok => "ok",
            CheckStatus::SustainedIncrease => "sustained_increase",
            CheckStatus::Threshold => "threshold",
            CheckStatus::StaleRelease => "stale_release",
        };
        f.write_str(name)
    }
}

/// Why a release was reported stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// The last tag build is older than the reminder threshold
    TagTooOld,
    /// No tag build was visible at all; `observed` is a synthetic age
    NoTagFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricCheckResult {
    pub status: CheckStatus,
    pub observed: f64,
    pub threshold: Option<f64>,
    pub rate: Option<f64>,
    pub stale_reason: Option<StaleReason>,
}

impl MetricCheckResult {
    pub fn ok(observed: f64) -> Self {
        Self {
            status: CheckStatus::Ok,
            observed,
            threshold: None,
            rate: None,
            stale_reason: None,
        }
    }

    pub fn sustained_increase(observed: f64, rate: f64) -> Self {
        Self {
            status: CheckStatus::SustainedIncrease,
            observed,
            threshold: None,
            rate: Some(rate),
            stale_reason: None,
        }
    }

    pub fn threshold(observed: f64, threshold: f64) -> Self {
        Self {
            status: CheckStatus::Threshold,
            observed,
            threshold: Some(threshold),
            rate: None,
            stale_reason: None,
        }
    }

    pub fn stale_release(age_ms: i64, threshold_ms: i64, reason: StaleReason) -> Self {
        Self {
            status: CheckStatus::StaleRelease,
            observed: age_ms as f64,
            threshold: Some(threshold_ms as f64),
            rate: None,
            stale_reason: Some(reason),
        }
    }

    pub fn is_alert(&self) -> bool {
        self.status != CheckStatus::Ok
    }
}

/// What produced an alert: a sampled metric kind or the release check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    Metric(MetricKind),
    Release,
}

impl fmt::Display for AlertSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSource::Metric(kind) => write!(f, "{kind}"),
            AlertSource::Release => f.write_str("release_tag"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub service_name: String,
    /// `None` for service-level alerts such as stale releases
    pub instance_id: Option<String>,
    pub source: AlertSource,
    pub result: MetricCheckResult,
    pub at_ms: i64,
}
