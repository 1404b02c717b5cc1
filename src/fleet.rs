//! Fleet View - read-only access to the live instances and their services
//!
//! The registry itself is an external collaborator behind [`InstanceRegistry`].
//! [`FleetView`] adds the staleness policy on top of it: when the registry
//! cannot be reached, the last good snapshot keeps being served until it is
//! older than `fleet_stale_max`, after which callers see the fleet as
//! unavailable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

use crate::error::FleetError;
use crate::{Instance, ServiceInfo};

/// Source of the current set of live instances
#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    async fn fetch_instances(&self) -> Result<Vec<Instance>, FleetError>;
}

/// Instances fixed in the configuration file
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    instances: Vec<Instance>,
}

impl StaticRegistry {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self { instances }
    }
}

#[async_trait]
impl InstanceRegistry for StaticRegistry {
    async fn fetch_instances(&self) -> Result<Vec<Instance>, FleetError> {
        Ok(self.instances.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminInstance {
    id: String,
    registration: AdminRegistration,
    #[serde(default)]
    status_info: Option<AdminStatusInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminRegistration {
    name: String,
    management_url: Option<String>,
    service_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdminStatusInfo {
    status: String,
}

/// Registry backed by an admin server's `GET {url}/instances` listing
pub struct AdminServerRegistry {
    client: reqwest::Client,
    url: String,
}

impl AdminServerRegistry {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl InstanceRegistry for AdminServerRegistry {
    #[instrument(skip(self), fields(registry = %self.url))]
    async fn fetch_instances(&self) -> Result<Vec<Instance>, FleetError> {
        let url = format!("{}/instances", self.url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FleetError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FleetError::Unavailable(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let listed: Vec<AdminInstance> = response
            .json()
            .await
            .map_err(|e| FleetError::Unavailable(format!("invalid registry payload: {e}")))?;

        let instances = listed
            .into_iter()
            .filter_map(|i| {
                let Some(endpoint) = i.registration.management_url.or(i.registration.service_url)
                else {
                    trace!("instance {} has no management url, skipping", i.id);
                    return None;
                };
                Some(Instance {
                    instance_id: i.id,
                    service_name: i.registration.name,
                    metrics_endpoint: endpoint.trim_end_matches('/').to_string(),
                    healthy: i.status_info.is_some_and(|s| s.status == "UP"),
                })
            })
            .collect();

        Ok(instances)
    }
}

struct CachedSnapshot {
    taken_at: Instant,
    instances: Arc<Vec<Instance>>,
}

pub struct FleetView {
    registry: Arc<dyn InstanceRegistry>,
    services: RwLock<HashMap<String, ServiceInfo>>,
    last_good: Mutex<Option<CachedSnapshot>>,
    stale_max: Duration,
}

impl FleetView {
    pub fn new(
        registry: Arc<dyn InstanceRegistry>,
        services: HashMap<String, ServiceInfo>,
        stale_max: Duration,
    ) -> Self {
        Self {
            registry,
            services: RwLock::new(services),
            last_good: Mutex::new(None),
            stale_max,
        }
    }

    /// Current fleet, or the cached one while it is younger than `stale_max`.
    ///
    /// The returned snapshot is not kept in sync with the registry; callers
    /// must not assume two calls see the same instances.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> Result<Arc<Vec<Instance>>, FleetError> {
        match self.registry.fetch_instances().await {
            Ok(instances) => {
                trace!("registry reported {} instances", instances.len());
                let instances = Arc::new(instances);
                *self.last_good.lock().unwrap_or_else(|e| e.into_inner()) = Some(CachedSnapshot {
                    taken_at: Instant::now(),
                    instances: instances.clone(),
                });
                Ok(instances)
            }
            Err(e) => {
                let cached = self.last_good.lock().unwrap_or_else(|e| e.into_inner());
                match cached.as_ref() {
                    Some(snapshot) if snapshot.taken_at.elapsed() <= self.stale_max => {
                        warn!("{e}, serving snapshot from {:?} ago", snapshot.taken_at.elapsed());
                        Ok(snapshot.instances.clone())
                    }
                    _ => Err(e),
                }
            }
        }
    }

    /// Like [`FleetView::snapshot`], but an unavailable fleet reads as empty
    pub async fn list_instances(&self) -> Vec<Instance> {
        match self.snapshot().await {
            Ok(instances) => instances.as_ref().clone(),
            Err(e) => {
                warn!("{e}, reporting an empty fleet");
                Vec::new()
            }
        }
    }

    pub fn service_info(&self, name: &str) -> Option<ServiceInfo> {
        self.services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Replace the service table (config reload)
    pub fn reload_services(&self, services: HashMap<String, ServiceInfo>) {
        debug!("reloading {} service definitions", services.len());
        *self.services.write().unwrap_or_else(|e| e.into_inner()) = services;
    }
}
