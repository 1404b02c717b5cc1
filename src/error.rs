//! Error taxonomy of the monitor
//!
//! Every per-tick error is captured by the tick handler that produced it and
//! turned into a log event plus a counter increment. Only [`ConfigError`] is
//! fatal, and only at startup.

use std::path::PathBuf;

use tracing::error;

/// Invalid or unreadable configuration. The monitor refuses to start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The instance registry could not be reached and the cached snapshot expired.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FleetError {
    #[error("instance registry unavailable: {0}")]
    Unavailable(String),
}

/// Failure to obtain one sample for one `(instance, kind)` during one tick.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("network error: {0}")]
    Network(String),

    #[error("failed to parse metrics payload: {0}")]
    Parse(String),

    #[error("metrics payload is missing `{0}`")]
    MissingField(String),
}

impl From<reqwest::Error> for SampleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SampleError::Parse(err.to_string())
        } else {
            SampleError::Network(err.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("forge request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("forge returned HTTP {0}")]
    Status(u16),

    #[error("failed to parse forge response: {0}")]
    Parse(String),

    #[error("unknown service `{0}`")]
    UnknownService(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("webhook returned HTTP {0}")]
    Status(u16),

    #[error("webhook rejected message: errcode={errcode}, errmsg={errmsg}")]
    Api { errcode: i64, errmsg: String },

    #[error("webhook delivery failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<NotifyError>,
    },
}

impl NotifyError {
    /// Network failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Network(_) => true,
            NotifyError::Status(status) => *status >= 500,
            NotifyError::Api { .. } | NotifyError::Exhausted { .. } => false,
        }
    }
}

/// Report a programming defect: fatal in debug builds, logged in release.
pub fn invariant_violated(what: &str) {
    error!("internal invariant violated: {what}");
    debug_assert!(false, "internal invariant violated: {what}");
}
