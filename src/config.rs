use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::{Instance, MetricKind, ServiceInfo, util};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub monitor: MonitorSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    /// Default tick interval for every metric kind
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,

    /// Ticks an instance may be missing from the fleet before its history is evicted
    #[serde(default = "default_evict_after_missing_ticks")]
    pub evict_after_missing_ticks: u32,

    #[serde(default = "default_fleet_stale_max_ms")]
    pub fleet_stale_max_ms: u64,

    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Kinds that are not listed here are not sampled
    #[serde(default)]
    pub metrics: HashMap<MetricKind, MetricConfig>,

    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,

    #[serde(default)]
    pub release: ReleaseConfig,

    pub forge: Option<ForgeConfig>,

    pub notifier: Option<NotifierConfig>,

    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub tick_interval_seconds: Option<u64>,
    #[serde(default = "default_keep_increasing_count")]
    pub keep_increasing_count: usize,
    #[serde(default)]
    pub diff_threshold: f64,
    pub absolute_max: Option<f64>,
    #[serde(default = "default_suppression_ms")]
    pub suppression_ms: u64,
    #[serde(default)]
    pub ignore_flat: bool,
}

/// Per-service replacement for any of the kind-wide detection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricOverride {
    pub keep_increasing_count: Option<usize>,
    pub diff_threshold: Option<f64>,
    pub absolute_max: Option<f64>,
    pub suppression_ms: Option<u64>,
    pub ignore_flat: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    pub forge_project_id: Option<u64>,
    pub remind_tag_min_diff_ms: Option<i64>,
    #[serde(default)]
    pub metrics: HashMap<MetricKind, MetricOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default = "default_release_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_suppression_ms")]
    pub suppression_ms: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_release_interval(),
            suppression_ms: default_suppression_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgeConfig {
    pub url_prefix: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub webhook_url: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

/// Source of the live instance list
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryConfig {
    /// Instances listed in the configuration file
    Static {
        #[serde(default)]
        instances: Vec<Instance>,
    },
    /// Spring-Boot-Admin style registry exposing `GET {url}/instances`
    AdminServer { url: String },
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig::Static {
            instances: Vec::new(),
        }
    }
}

fn default_tick_interval() -> u64 {
    30
}

fn default_evict_after_missing_ticks() -> u32 {
    1
}

fn default_fleet_stale_max_ms() -> u64 {
    60_000
}

fn default_parallelism() -> usize {
    16
}

fn default_enabled() -> bool {
    true
}

fn default_keep_increasing_count() -> usize {
    5
}

fn default_suppression_ms() -> u64 {
    600_000
}

fn default_release_interval() -> u64 {
    3600
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

/// Detection and dispatch settings of one metric kind after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSettings {
    pub tick_interval_seconds: u64,
    pub keep_increasing_count: usize,
    pub diff_threshold: f64,
    pub absolute_max: Option<f64>,
    pub suppression_ms: u64,
    pub ignore_flat: bool,
}

impl MetricSettings {
    /// Apply a service override on top of the kind-wide settings
    pub fn merged(&self, service_override: Option<&MetricOverride>) -> MetricSettings {
        let Some(o) = service_override else {
            return self.clone();
        };

        MetricSettings {
            tick_interval_seconds: self.tick_interval_seconds,
            keep_increasing_count: o.keep_increasing_count.unwrap_or(self.keep_increasing_count),
            diff_threshold: o.diff_threshold.unwrap_or(self.diff_threshold),
            absolute_max: o.absolute_max.or(self.absolute_max),
            suppression_ms: o.suppression_ms.unwrap_or(self.suppression_ms),
            ignore_flat: o.ignore_flat.unwrap_or(self.ignore_flat),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedForgeConfig {
    pub url_prefix: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedNotifierConfig {
    pub webhook_url: String,
    pub retries: u32,
    pub backoff_base: Duration,
}

#[derive(Debug, Clone)]
pub struct ResolvedReleaseConfig {
    pub check_interval_seconds: u64,
    pub suppression_ms: u64,
}

/// Validated configuration the monitor is built from
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Enabled kinds only
    pub metrics: BTreeMap<MetricKind, MetricSettings>,
    pub parallelism: usize,
    pub evict_after_missing_ticks: u32,
    pub fleet_stale_max: Duration,
    pub services: HashMap<String, ServiceInfo>,
    pub release: ResolvedReleaseConfig,
    pub forge: Option<ResolvedForgeConfig>,
    pub notifier: Option<ResolvedNotifierConfig>,
    pub registry: RegistryConfig,
}

impl MonitorConfig {
    /// Secrets from the environment win over the file
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(token) = util::get_forge_token() {
            if let Some(forge) = self.forge.as_mut() {
                debug!("using forge token from environment");
                forge.token = token;
            }
        }

        if let Some(url) = util::get_webhook_url() {
            debug!("using webhook url from environment");
            match self.notifier.as_mut() {
                Some(notifier) => notifier.webhook_url = url,
                None => {
                    self.notifier = Some(ResolvedNotifierConfig {
                        webhook_url: url,
                        retries: default_retries(),
                        backoff_base: Duration::from_millis(default_backoff_base_ms()),
                    })
                }
            }
        }

        self
    }
}

impl Config {
    pub fn resolve(self) -> Result<MonitorConfig, ConfigError> {
        let m = self.monitor;

        if m.tick_interval_seconds == 0 {
            return Err(invalid("monitor.tick_interval_seconds must be at least 1"));
        }
        if m.sampler.parallelism == 0 {
            return Err(invalid("monitor.sampler.parallelism must be at least 1"));
        }
        if m.evict_after_missing_ticks == 0 {
            return Err(invalid("monitor.evict_after_missing_ticks must be at least 1"));
        }

        let mut metrics = BTreeMap::new();
        for (kind, metric) in m.metrics {
            let prefix = format!("monitor.metrics.{kind}");
            let tick_interval_seconds = metric
                .tick_interval_seconds
                .unwrap_or(m.tick_interval_seconds);
            if tick_interval_seconds == 0 {
                return Err(invalid(format!(
                    "{prefix}.tick_interval_seconds must be at least 1"
                )));
            }

            let settings = MetricSettings {
                tick_interval_seconds,
                keep_increasing_count: metric.keep_increasing_count,
                diff_threshold: metric.diff_threshold,
                absolute_max: metric.absolute_max,
                suppression_ms: metric.suppression_ms,
                ignore_flat: metric.ignore_flat,
            };
            validate_detection(&prefix, &settings)?;

            if metric.enabled {
                metrics.insert(kind, settings);
            } else {
                trace!("{prefix} is disabled");
            }
        }

        let mut services = HashMap::new();
        for (name, service) in m.services {
            let prefix = format!("monitor.services.{name}");
            if let Some(diff) = service.remind_tag_min_diff_ms {
                if diff <= 0 {
                    return Err(invalid(format!(
                        "{prefix}.remind_tag_min_diff_ms must be positive"
                    )));
                }
            }

            for (kind, o) in &service.metrics {
                let prefix = format!("{prefix}.metrics.{kind}");
                if let Some(base) = metrics.get(kind) {
                    validate_detection(&prefix, &base.merged(Some(o)))?;
                } else {
                    validate_override(&prefix, o)?;
                }
            }

            services.insert(
                name.clone(),
                ServiceInfo {
                    name,
                    forge_project_id: service.forge_project_id,
                    remind_tag_min_diff_ms: service.remind_tag_min_diff_ms,
                    metric_overrides: service.metrics,
                },
            );
        }

        if m.release.check_interval_seconds == 0 {
            return Err(invalid("monitor.release.check_interval_seconds must be at least 1"));
        }

        let forge = match m.forge {
            Some(forge) if forge.url_prefix.trim().is_empty() => {
                return Err(invalid("monitor.forge.url_prefix must not be empty"));
            }
            Some(forge) => Some(ResolvedForgeConfig {
                url_prefix: forge.url_prefix.trim_end_matches('/').to_string(),
                token: forge.token,
            }),
            None => None,
        };

        let notifier = match m.notifier {
            Some(notifier) if notifier.webhook_url.trim().is_empty() => {
                return Err(invalid("monitor.notifier.webhook_url must not be empty"));
            }
            Some(notifier) => Some(ResolvedNotifierConfig {
                webhook_url: notifier.webhook_url,
                retries: notifier.retries,
                backoff_base: Duration::from_millis(notifier.backoff_base_ms),
            }),
            None => None,
        };

        if let RegistryConfig::AdminServer { url } = &m.registry {
            if url.trim().is_empty() {
                return Err(invalid("monitor.registry.url must not be empty"));
            }
        }

        Ok(MonitorConfig {
            metrics,
            parallelism: m.sampler.parallelism,
            evict_after_missing_ticks: m.evict_after_missing_ticks,
            fleet_stale_max: Duration::from_millis(m.fleet_stale_max_ms),
            services,
            release: ResolvedReleaseConfig {
                check_interval_seconds: m.release.check_interval_seconds,
                suppression_ms: m.release.suppression_ms,
            },
            forge,
            notifier,
            registry: m.registry,
        })
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

fn validate_detection(prefix: &str, settings: &MetricSettings) -> Result<(), ConfigError> {
    if settings.keep_increasing_count < 2 {
        return Err(invalid(format!(
            "{prefix}.keep_increasing_count must be at least 2 (got {})",
            settings.keep_increasing_count
        )));
    }
    if !settings.diff_threshold.is_finite() || settings.diff_threshold < 0.0 {
        return Err(invalid(format!(
            "{prefix}.diff_threshold must be a non-negative number"
        )));
    }
    if settings.absolute_max.is_some_and(|max| !max.is_finite()) {
        return Err(invalid(format!("{prefix}.absolute_max must be finite")));
    }
    Ok(())
}

fn validate_override(prefix: &str, o: &MetricOverride) -> Result<(), ConfigError> {
    if o.keep_increasing_count.is_some_and(|k| k < 2) {
        return Err(invalid(format!(
            "{prefix}.keep_increasing_count must be at least 2"
        )));
    }
    if o
        .diff_threshold
        .is_some_and(|d| !d.is_finite() || d < 0.0)
    {
        return Err(invalid(format!(
            "{prefix}.diff_threshold must be a non-negative number"
        )));
    }
    Ok(())
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}
