use crate::config::ClientConfig;
use crate::errors::{Error, Result};
use crate::metrics::REQUEST_LATENCY_SECONDS;
use crate::model::{DeviceId, TelemetryPoint, Tier};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Where tier data comes from. [`HttpSource`] is the production implementation.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn historical(&self, device: &DeviceId) -> Result<Vec<TelemetryPoint>>;

    async fn realtime(&self, device: &DeviceId) -> Result<Vec<TelemetryPoint>>;

    async fn latest(&self, device: &DeviceId) -> Result<Option<TelemetryPoint>>;
}

/// Telemetry REST API client with a per-request timeout and fixed-delay retry.
#[derive(Debug, Clone)]
pub struct HttpSource {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpSource {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::InvalidBaseUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidBaseUrl(config.base_url.clone()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            timeout: config.request_timeout,
            retry: RetryPolicy::new(config.retry_max, config.retry_delay),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Endpoint URL for `tier`; the device id is encoded as a single path segment.
    pub fn endpoint(&self, tier: Tier, device: &DeviceId) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(tier.path_segments(device));
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        tier: Tier,
        device: &DeviceId,
    ) -> Result<Option<T>> {
        let url = self.endpoint(tier, device);
        let label = format!("GET {}", url);
        self.retry.run(&label, || self.send_once(url.clone())).await
    }

    async fn send_once<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let start = Instant::now();
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;
        REQUEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        debug!("{} returned {} bytes", url, body.len());

        decode_body(&body)
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.timeout)
        } else if err.is_decode() {
            Error::Decode(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}

/// Empty and `null` bodies decode to `None`.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(serde_json::from_slice::<Option<T>>(body)?)
}

#[async_trait]
impl TelemetrySource for HttpSource {
    async fn historical(&self, device: &DeviceId) -> Result<Vec<TelemetryPoint>> {
        Ok(self
            .get_json(Tier::Historical, device)
            .await?
            .unwrap_or_default())
    }

    async fn realtime(&self, device: &DeviceId) -> Result<Vec<TelemetryPoint>> {
        Ok(self
            .get_json(Tier::Realtime, device)
            .await?
            .unwrap_or_default())
    }

    async fn latest(&self, device: &DeviceId) -> Result<Option<TelemetryPoint>> {
        self.get_json(Tier::Latest, device).await
    }
}
