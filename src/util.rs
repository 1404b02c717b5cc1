use std::time::Duration;

use chrono::Utc;

const FORGE_TOKEN: &str = "MONITOR_FORGE_TOKEN";

pub fn get_forge_token() -> Option<String> {
    std::env::var(FORGE_TOKEN).ok().filter(|token| !token.is_empty())
}

const WEBHOOK_URL: &str = "MONITOR_WEBHOOK_URL";

pub fn get_webhook_url() -> Option<String> {
    std::env::var(WEBHOOK_URL).ok().filter(|url| !url.is_empty())
}

/// Connect timeout for every outbound call
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Read timeout for every outbound call
pub const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Build the shared, connection-pooled HTTP client.
///
/// `pool_size` bounds the idle connections kept per host; size it to
/// `parallelism × enabled kinds` so a full fan-out can reuse connections.
pub fn http_client(pool_size: usize) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .pool_max_idle_per_host(pool_size.max(1))
        .build()
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
