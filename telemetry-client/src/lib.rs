//! Telemetry client for oxygen-plant dashboards.
//!
//! Wraps the telemetry REST API with per-device caches for three tiers
//! (latest reading, realtime window, historical window), a fixed-delay retry
//! around every request, and a polling driver that keeps a watchable
//! [`DashboardSnapshot`] current for one device at a time.

pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod poller;
pub mod retry;
pub mod source;
pub mod status;

pub use cache::{CacheEntry, TierCache};
pub use client::TelemetryClient;
pub use config::ClientConfig;
pub use errors::{Error, Result};
pub use model::{DeviceId, TelemetryPoint, Tier, TierData};
pub use poller::{ClearScope, DashboardSnapshot, PollPlan, PollingDriver, TierSlot, TierStatus};
pub use retry::RetryPolicy;
pub use source::{HttpSource, TelemetrySource};
pub use status::{DeviceStatus, StatusSummary};
