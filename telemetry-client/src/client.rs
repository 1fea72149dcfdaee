use crate::cache::TierCache;
use crate::config::ClientConfig;
use crate::errors::Result;
use crate::model::{DeviceId, TelemetryPoint, Tier, TierData};
use crate::source::{HttpSource, TelemetrySource};
use std::sync::Arc;
use tracing::info;

/// Tiered telemetry cache in front of a [`TelemetrySource`].
///
/// Each instance owns its own caches; create one per consuming view and drop
/// it with the view.
pub struct TelemetryClient {
    source: Arc<dyn TelemetrySource>,
    latest: TierCache<Option<TelemetryPoint>>,
    realtime: TierCache<Vec<TelemetryPoint>>,
    historical: TierCache<Vec<TelemetryPoint>>,
}

impl TelemetryClient {
    pub fn new(source: Arc<dyn TelemetrySource>, config: &ClientConfig) -> Self {
        Self {
            source,
            latest: TierCache::new(Tier::Latest, config.ttl(Tier::Latest)),
            realtime: TierCache::new(Tier::Realtime, config.ttl(Tier::Realtime)),
            historical: TierCache::new(Tier::Historical, config.ttl(Tier::Historical)),
        }
    }

    /// Client backed by the HTTP API described by `config`.
    pub fn http(config: &ClientConfig) -> Result<Self> {
        let source = HttpSource::new(config)?;
        info!("Telemetry client using {}", source.base_url());
        Ok(Self::new(Arc::new(source), config))
    }

    pub async fn latest(&self, device: &DeviceId) -> Result<Arc<Option<TelemetryPoint>>> {
        self.latest
            .get(device, || self.source.latest(device))
            .await
    }

    pub async fn realtime(&self, device: &DeviceId) -> Result<Arc<Vec<TelemetryPoint>>> {
        self.realtime
            .get(device, || self.source.realtime(device))
            .await
    }

    pub async fn historical(&self, device: &DeviceId) -> Result<Arc<Vec<TelemetryPoint>>> {
        self.historical
            .get(device, || self.source.historical(device))
            .await
    }

    pub async fn get(&self, tier: Tier, device: &DeviceId) -> Result<TierData> {
        Ok(match tier {
            Tier::Latest => TierData::Latest(self.latest(device).await?),
            Tier::Realtime => TierData::Realtime(self.realtime(device).await?),
            Tier::Historical => TierData::Historical(self.historical(device).await?),
        })
    }

    pub fn latest_cache(&self) -> &TierCache<Option<TelemetryPoint>> {
        &self.latest
    }

    pub fn realtime_cache(&self) -> &TierCache<Vec<TelemetryPoint>> {
        &self.realtime
    }

    pub fn historical_cache(&self) -> &TierCache<Vec<TelemetryPoint>> {
        &self.historical
    }

    /// Drops `device` from every tier.
    pub fn invalidate_device(&self, device: &DeviceId) {
        self.latest.invalidate(device);
        self.realtime.invalidate(device);
        self.historical.invalidate(device);
        info!("Cleared cache for device {}", device);
    }

    /// Drops every device from every tier.
    pub fn invalidate_all(&self) {
        self.latest.invalidate_all();
        self.realtime.invalidate_all();
        self.historical.invalidate_all();
        info!("Cleared all device cache");
    }
}
