//! Trend Detector - classifies the newest sample of a history window
//!
//! ```text
//! A configured and latest >= A          → Threshold(latest)
//! n < K                                  → Ok            (warming up)
//! any of the last K-1 steps < D          → Ok
//! otherwise                              → SustainedIncrease(rate)
//!                                          rate = (w[n-1] - w[n-2]) * 60 / I
//! ```
//!
//! Requiring every consecutive step to clear `D` rejects single spikes; with
//! `D = 0` the rule reads "monotonically non-decreasing over K samples".

use crate::config::MetricSettings;
use crate::error::invariant_violated;
use crate::{MetricCheckResult, Sample};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendConfig {
    /// `K`, number of samples the rule looks at (≥ 2)
    pub keep_increasing_count: usize,
    /// `D`, minimum step between consecutive samples
    pub diff_threshold: f64,
    /// `I`, seconds between samples, used to express the rate per minute
    pub check_interval_seconds: u64,
    /// `A`, optional upper bound on the latest value
    pub absolute_max: Option<f64>,
    /// Treat a zero-rate increase as `Ok`
    pub ignore_flat: bool,
}

impl From<&MetricSettings> for TrendConfig {
    fn from(settings: &MetricSettings) -> Self {
        Self {
            keep_increasing_count: settings.keep_increasing_count,
            diff_threshold: settings.diff_threshold,
            check_interval_seconds: settings.tick_interval_seconds,
            absolute_max: settings.absolute_max,
            ignore_flat: settings.ignore_flat,
        }
    }
}

/// Evaluate a window (oldest first). Pure: the same window yields the same result.
pub fn detect(window: &[Sample], config: &TrendConfig) -> MetricCheckResult {
    let Some(latest) = window.last() else {
        return MetricCheckResult::ok(0.0);
    };

    if let Some(max) = config.absolute_max {
        if latest.value >= max {
            return MetricCheckResult::threshold(latest.value, max);
        }
    }

    let k = config.keep_increasing_count;
    if k < 2 || config.check_interval_seconds == 0 {
        invariant_violated("trend config needs K >= 2 and a positive check interval");
        return MetricCheckResult::ok(latest.value);
    }

    let n = window.len();
    if n < k {
        return MetricCheckResult::ok(latest.value);
    }

    let recent = &window[n - k..];
    let sustained = recent
        .windows(2)
        .rev()
        .all(|pair| pair[1].value - pair[0].value >= config.diff_threshold);
    if !sustained {
        return MetricCheckResult::ok(latest.value);
    }

    let rate =
        (window[n - 1].value - window[n - 2].value) * 60.0 / config.check_interval_seconds as f64;
    if config.ignore_flat && rate == 0.0 {
        return MetricCheckResult::ok(latest.value);
    }

    MetricCheckResult::sustained_increase(latest.value, rate)
}
