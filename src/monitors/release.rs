//! Release Freshness Checker
//!
//! Asks the code forge when the newest tag build of a service started and
//! raises a `StaleRelease` alert once that is longer ago than the service's
//! `remind_tag_min_diff_ms`. A service with no visible tag build is always
//! reported, with an age of twice the threshold.

use std::sync::Arc;

use chrono::DateTime;
use serde::Deserialize;
use tracing::{debug, instrument, trace, warn};

use crate::config::ResolvedForgeConfig;
use crate::error::ForgeError;
use crate::fleet::FleetView;
use crate::{AlertEvent, AlertSource, MetricCheckResult, StaleReason};

/// One entry of the forge jobs listing; other fields are ignored
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForgeJob {
    #[serde(default)]
    pub tag: bool,
    #[serde(default)]
    pub started_at: Option<String>,
}

/// Minimal client for the forge jobs API
#[derive(Debug, Clone)]
pub struct ForgeClient {
    client: reqwest::Client,
    url_prefix: String,
    token: String,
}

impl ForgeClient {
    pub fn new(client: reqwest::Client, config: &ResolvedForgeConfig) -> Self {
        Self {
            client,
            url_prefix: config.url_prefix.clone(),
            token: config.token.clone(),
        }
    }

    pub fn jobs_url(&self, project_id: u64) -> String {
        format!(
            "{}/api/v4/projects/{project_id}/jobs?scope[]=running&scope[]=success",
            self.url_prefix
        )
    }

    #[instrument(skip(self))]
    pub async fn jobs(&self, project_id: u64) -> Result<Vec<ForgeJob>, ForgeError> {
        let url = self.jobs_url(project_id);
        trace!("requesting {url}");

        let response = self
            .client
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ForgeError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ForgeError::Parse(e.to_string()))
    }
}

/// Start time in epoch milliseconds of the first tag job, in listing order.
///
/// `Ok(None)` when no job is a tag build.
pub fn last_tag_started_ms(jobs: &[ForgeJob]) -> Result<Option<i64>, ForgeError> {
    let Some(job) = jobs.iter().find(|job| job.tag) else {
        return Ok(None);
    };

    let started_at = job
        .started_at
        .as_deref()
        .ok_or_else(|| ForgeError::Parse("tag job without started_at".to_string()))?;

    let started = DateTime::parse_from_rfc3339(started_at)
        .map_err(|e| ForgeError::Parse(format!("invalid started_at `{started_at}`: {e}")))?;

    Ok(Some(started.timestamp_millis()))
}

pub struct ReleaseFreshnessChecker {
    forge: ForgeClient,
    fleet: Arc<FleetView>,
}

impl ReleaseFreshnessChecker {
    pub fn new(forge: ForgeClient, fleet: Arc<FleetView>) -> Self {
        Self { forge, fleet }
    }

    /// Services that carry everything a release check needs
    pub fn checked_services(&self) -> Vec<String> {
        self.fleet
            .service_names()
            .into_iter()
            .filter(|name| {
                self.fleet.service_info(name).is_some_and(|info| {
                    info.forge_project_id.is_some() && info.remind_tag_min_diff_ms.is_some()
                })
            })
            .collect()
    }

    /// Check one service; forge failures are logged and yield `None`.
    pub async fn check(&self, service_name: &str) -> Option<AlertEvent> {
        match self.try_check_at(service_name, crate::util::now_ms()).await {
            Ok(event) => event,
            Err(e) => {
                warn!("release check of {service_name} failed: {e}");
                None
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn try_check_at(
        &self,
        service_name: &str,
        now_ms: i64,
    ) -> Result<Option<AlertEvent>, ForgeError> {
        let info = self
            .fleet
            .service_info(service_name)
            .ok_or_else(|| ForgeError::UnknownService(service_name.to_string()))?;

        let (Some(project_id), Some(remind_ms)) =
            (info.forge_project_id, info.remind_tag_min_diff_ms)
        else {
            trace!("{service_name} has no release reminder configured");
            return Ok(None);
        };

        let jobs = self.forge.jobs(project_id).await?;

        let (age_ms, reason) = match last_tag_started_ms(&jobs)? {
            Some(started_ms) => (now_ms - started_ms, StaleReason::TagTooOld),
            None => {
                debug!("no tag build visible for {service_name}");
                (remind_ms.saturating_mul(2), StaleReason::NoTagFound)
            }
        };

        if age_ms <= remind_ms {
            trace!("{service_name}: last tag {age_ms}ms ago, within {remind_ms}ms");
            return Ok(None);
        }

        Ok(Some(AlertEvent {
            service_name: service_name.to_string(),
            instance_id: None,
            source: AlertSource::Release,
            result: MetricCheckResult::stale_release(age_ms, remind_ms, reason),
            at_ms: now_ms,
        }))
    }
}
