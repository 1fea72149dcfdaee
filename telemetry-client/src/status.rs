use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Connectivity/health bucket a device is reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Offline,
    Error,
    Warning,
    Normal,
}

impl FromStr for DeviceStatus {
    type Err = String;

    /// Case-insensitive; `critical` counts as an error and `good` as normal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offline" => Ok(DeviceStatus::Offline),
            "error" | "critical" => Ok(DeviceStatus::Error),
            "warning" => Ok(DeviceStatus::Warning),
            "normal" | "good" => Ok(DeviceStatus::Normal),
            other => Err(format!("Unknown device status: {}", other)),
        }
    }
}

/// Per-bucket device counts for a site or the whole fleet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub offline: usize,
    pub error: usize,
    pub warning: usize,
    pub normal: usize,
}

impl StatusSummary {
    pub fn record(&mut self, status: DeviceStatus) {
        match status {
            DeviceStatus::Offline => self.offline += 1,
            DeviceStatus::Error => self.error += 1,
            DeviceStatus::Warning => self.warning += 1,
            DeviceStatus::Normal => self.normal += 1,
        }
    }

    /// Counts reported status strings, skipping ones that are not recognised.
    pub fn from_statuses<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut summary = Self::default();
        for status in statuses {
            if let Ok(status) = status.as_ref().parse() {
                summary.record(status);
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.offline + self.error + self.warning + self.normal
    }
}
