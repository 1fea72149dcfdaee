use crate::model::Tier;
use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

/// Settings for the HTTP source and the tier caches.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub retry_max: u32,
    pub retry_delay: Duration,
    pub latest_ttl: Duration,
    pub realtime_ttl: Duration,
    pub historical_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            retry_max: 2,
            retry_delay: Duration::from_secs(1),
            latest_ttl: Tier::Latest.default_ttl(),
            realtime_ttl: Tier::Realtime.default_ttl(),
            historical_ttl: Tier::Historical.default_ttl(),
        }
    }
}

impl ClientConfig {
    /// Reads `TELEMETRY_*` variables; missing or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            base_url: lookup("TELEMETRY_API_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.base_url),
            request_timeout: millis("TELEMETRY_REQUEST_TIMEOUT_MS", defaults.request_timeout),
            retry_max: lookup("TELEMETRY_RETRY_MAX")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.retry_max),
            retry_delay: millis("TELEMETRY_RETRY_DELAY_MS", defaults.retry_delay),
            latest_ttl: millis("TELEMETRY_TTL_LATEST_MS", defaults.latest_ttl),
            realtime_ttl: millis("TELEMETRY_TTL_REALTIME_MS", defaults.realtime_ttl),
            historical_ttl: millis("TELEMETRY_TTL_HISTORICAL_MS", defaults.historical_ttl),
        }
    }

    pub fn ttl(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Latest => self.latest_ttl,
            Tier::Realtime => self.realtime_ttl,
            Tier::Historical => self.historical_ttl,
        }
    }
}
