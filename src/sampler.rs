//! Metric Sampler - pulls one value per `(instance, kind)` per tick
//!
//! ```text
//! GET {endpoint}/metrics/{metric_id}
//! → {"name": "...", "measurements": [{"statistic": "VALUE", "value": 123.0}, ...]}
//! ```

use async_trait::async_trait;
use serde_json::Value;
use tracing::{instrument, trace};

use crate::error::SampleError;
use crate::{Instance, MetricKind};

/// Anything that can produce one numeric sample for an instance
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn sample(&self, instance: &Instance, kind: MetricKind) -> Result<f64, SampleError>;
}

/// Samples the actuator-style metrics endpoint of each instance over HTTP
#[derive(Debug, Clone)]
pub struct HttpMetricSampler {
    /// Shared client; timeouts are configured on the client
    client: reqwest::Client,
}

impl HttpMetricSampler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn metric_url(instance: &Instance, kind: MetricKind) -> String {
        format!("{}/metrics/{}", instance.metrics_endpoint, kind.metric_id())
    }
}

#[async_trait]
impl MetricSource for HttpMetricSampler {
    #[instrument(skip(self, instance), fields(instance = %instance.instance_id, kind = %kind))]
    async fn sample(&self, instance: &Instance, kind: MetricKind) -> Result<f64, SampleError> {
        let url = Self::metric_url(instance, kind);
        trace!("requesting {url}");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(SampleError::Network(format!("HTTP {}", response.status())));
        }

        let body = response.text().await?;
        extract_measurement(&body, kind)
    }
}

/// Pull the kind's statistic out of a metrics payload, applying its scale.
pub fn extract_measurement(body: &str, kind: MetricKind) -> Result<f64, SampleError> {
    let wanted = kind.measurement();
    let payload: Value =
        serde_json::from_str(body).map_err(|e| SampleError::Parse(e.to_string()))?;

    let measurements = payload
        .get("measurements")
        .and_then(Value::as_array)
        .ok_or_else(|| SampleError::MissingField("measurements".to_string()))?;

    let measurement = measurements
        .iter()
        .find(|m| m.get("statistic").and_then(Value::as_str) == Some(wanted.statistic))
        .ok_or_else(|| SampleError::MissingField(wanted.statistic.to_string()))?;

    let value = measurement
        .get("value")
        .ok_or_else(|| SampleError::MissingField("value".to_string()))?
        .as_f64()
        .ok_or_else(|| SampleError::Parse(format!("{} value is not a number", wanted.statistic)))?;

    Ok(value * wanted.scale)
}
