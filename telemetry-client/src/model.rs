use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Opaque identifier of a physical telemetry device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One reading reported by an oxygen plant device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub oil_level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_alerts: Option<u32>,
}

/// Cache and polling tier. Each tier has its own endpoint and freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Latest,
    Realtime,
    Historical,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Latest, Tier::Realtime, Tier::Historical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Latest => "latest",
            Tier::Realtime => "realtime",
            Tier::Historical => "historical",
        }
    }

    pub fn default_ttl(&self) -> Duration {
        match self {
            Tier::Latest => Duration::from_millis(2000),
            Tier::Realtime => Duration::from_millis(3000),
            Tier::Historical => Duration::from_millis(10_000),
        }
    }

    pub fn default_poll_interval(&self) -> Duration {
        self.default_ttl()
    }

    /// Path segments below the API base for `device`.
    pub fn path_segments<'a>(&self, device: &'a DeviceId) -> Vec<&'a str> {
        match self {
            Tier::Latest => vec!["telemetry", "latest", device.as_str()],
            Tier::Realtime => vec!["telemetry", "realtime", device.as_str()],
            Tier::Historical => vec!["telemetry", device.as_str()],
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value returned by a tier lookup
#[derive(Debug, Clone, PartialEq)]
pub enum TierData {
    Latest(Arc<Option<TelemetryPoint>>),
    Realtime(Arc<Vec<TelemetryPoint>>),
    Historical(Arc<Vec<TelemetryPoint>>),
}

impl TierData {
    pub fn tier(&self) -> Tier {
        match self {
            TierData::Latest(_) => Tier::Latest,
            TierData::Realtime(_) => Tier::Realtime,
            TierData::Historical(_) => Tier::Historical,
        }
    }

    /// True when the request succeeded but carried no readings.
    pub fn is_empty(&self) -> bool {
        match self {
            TierData::Latest(point) => point.is_none(),
            TierData::Realtime(points) | TierData::Historical(points) => points.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_uses_camel_case_wire_names() {
        let json = r#"{
            "timestamp": "2024-03-01T10:15:00Z",
            "temperature": 31.5,
            "oilLevel": 78.0,
            "openAlerts": 2
        }"#;

        let point: TelemetryPoint = serde_json::from_str(json).unwrap();
        assert_eq!(point.oil_level, 78.0);
        assert_eq!(point.open_alerts, Some(2));
        assert_eq!(point.humidity, None);

        let back = serde_json::to_value(&point).unwrap();
        assert!(back.get("oilLevel").is_some());
        assert!(back.get("humidity").is_none());
    }

    #[test]
    fn test_historical_path_has_no_tier_segment() {
        let device = DeviceId::from("dev-1");
        assert_eq!(Tier::Historical.path_segments(&device), ["telemetry", "dev-1"]);
        assert_eq!(
            Tier::Latest.path_segments(&device),
            ["telemetry", "latest", "dev-1"]
        );
    }

    #[test]
    fn test_default_ttls() {
        assert_eq!(Tier::Latest.default_ttl(), Duration::from_secs(2));
        assert_eq!(Tier::Realtime.default_ttl(), Duration::from_secs(3));
        assert_eq!(Tier::Historical.default_ttl(), Duration::from_secs(10));
    }

    #[test]
    fn test_empty_tier_data() {
        assert!(TierData::Latest(Arc::new(None)).is_empty());
        assert!(TierData::Historical(Arc::new(Vec::new())).is_empty());
    }
}
