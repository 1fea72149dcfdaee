use crate::client::TelemetryClient;
use crate::errors::Result;
use crate::model::{DeviceId, TelemetryPoint, Tier, TierData};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Which cache entries to drop when the polling target changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// Only the previous target's entries, in every tier.
    Device,
    /// Every entry in every tier.
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierStatus {
    /// No tick has completed yet for this session.
    Pending,
    Ready,
    /// Request succeeded without readings.
    NoData,
    /// Last tick failed. Data from an earlier tick, if any, is kept.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierSlot<T> {
    pub data: Option<Arc<T>>,
    pub status: TierStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for TierSlot<T> {
    fn default() -> Self {
        Self {
            data: None,
            status: TierStatus::Pending,
            updated_at: None,
        }
    }
}

impl<T> TierSlot<T> {
    fn succeed(&mut self, data: Arc<T>, empty: bool) {
        self.data = Some(data);
        self.status = if empty {
            TierStatus::NoData
        } else {
            TierStatus::Ready
        };
        self.updated_at = Some(Utc::now());
    }

    fn fail(&mut self, message: String) {
        self.status = TierStatus::Failed(message);
        self.updated_at = Some(Utc::now());
    }
}

/// Observable state of the dashboard for the current polling target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSnapshot {
    pub session: Option<Uuid>,
    pub device: Option<DeviceId>,
    pub latest: TierSlot<Option<TelemetryPoint>>,
    pub realtime: TierSlot<Vec<TelemetryPoint>>,
    pub historical: TierSlot<Vec<TelemetryPoint>>,
}

impl DashboardSnapshot {
    fn for_session(session: Uuid, device: DeviceId) -> Self {
        Self {
            session: Some(session),
            device: Some(device),
            ..Self::default()
        }
    }

    pub fn status(&self, tier: Tier) -> &TierStatus {
        match tier {
            Tier::Latest => &self.latest.status,
            Tier::Realtime => &self.realtime.status,
            Tier::Historical => &self.historical.status,
        }
    }

    pub fn has_errors(&self) -> bool {
        Tier::ALL
            .iter()
            .any(|tier| matches!(self.status(*tier), TierStatus::Failed(_)))
    }

    fn apply(&mut self, tier: Tier, result: Result<TierData>) {
        match result {
            Ok(data) => {
                let empty = data.is_empty();
                match data {
                    TierData::Latest(v) => self.latest.succeed(v, empty),
                    TierData::Realtime(v) => self.realtime.succeed(v, empty),
                    TierData::Historical(v) => self.historical.succeed(v, empty),
                }
            }
            Err(e) => {
                let message = e.to_string();
                match tier {
                    Tier::Latest => self.latest.fail(message),
                    Tier::Realtime => self.realtime.fail(message),
                    Tier::Historical => self.historical.fail(message),
                }
            }
        }
    }
}

/// Tiers to poll and the interval of each.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPlan {
    schedule: Vec<(Tier, Duration)>,
}

impl Default for PollPlan {
    fn default() -> Self {
        Self::only(&Tier::ALL)
    }
}

impl PollPlan {
    /// Polls `tiers` at their default intervals.
    pub fn only(tiers: &[Tier]) -> Self {
        let mut plan = Self {
            schedule: Vec::new(),
        };
        for tier in tiers {
            plan = plan.with_interval(*tier, tier.default_poll_interval());
        }
        plan
    }

    pub fn with_interval(mut self, tier: Tier, period: Duration) -> Self {
        match self.schedule.iter_mut().find(|(t, _)| *t == tier) {
            Some(entry) => entry.1 = period,
            None => self.schedule.push((tier, period)),
        }
        self
    }

    pub fn tiers(&self) -> impl Iterator<Item = (Tier, Duration)> + '_ {
        self.schedule.iter().copied()
    }
}

struct ActiveSession {
    id: Uuid,
    device: DeviceId,
    tasks: Vec<JoinHandle<()>>,
}

/// Keeps a [`DashboardSnapshot`] current for one target device by polling each
/// planned tier on its own interval.
///
/// At most one task per tier exists at any time. Switching the target or
/// stopping waits until every task of the old target has terminated.
pub struct PollingDriver {
    client: Arc<TelemetryClient>,
    plan: PollPlan,
    state: Arc<watch::Sender<DashboardSnapshot>>,
    active: Option<ActiveSession>,
}

impl PollingDriver {
    pub fn new(client: Arc<TelemetryClient>, plan: PollPlan) -> Self {
        let (state, _) = watch::channel(DashboardSnapshot::default());
        Self {
            client,
            plan,
            state: Arc::new(state),
            active: None,
        }
    }

    pub fn client(&self) -> &Arc<TelemetryClient> {
        &self.client
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.state.borrow().clone()
    }

    pub fn target(&self) -> Option<&DeviceId> {
        self.active.as_ref().map(|s| &s.device)
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Starts polling `device`, replacing any current target.
    pub async fn start(&mut self, device: DeviceId) {
        self.switch_target(device, ClearScope::Device).await;
    }

    /// Stops the current target, clears cache entries per `scope`, then starts
    /// polling `device` with an immediate first fetch on every planned tier.
    pub async fn switch_target(&mut self, device: DeviceId, scope: ClearScope) {
        let previous = self.cancel_tasks().await;

        match (scope, previous) {
            (ClearScope::All, _) => self.client.invalidate_all(),
            (ClearScope::Device, Some(prev)) => self.client.invalidate_device(&prev),
            (ClearScope::Device, None) => {}
        }

        let session = Uuid::new_v4();
        self.state
            .send_replace(DashboardSnapshot::for_session(session, device.clone()));

        let tasks = self
            .plan
            .tiers()
            .map(|(tier, period)| {
                tokio::spawn(poll_tier(
                    Arc::clone(&self.client),
                    Arc::clone(&self.state),
                    session,
                    device.clone(),
                    tier,
                    period,
                ))
            })
            .collect::<Vec<_>>();

        info!(
            "Polling {} ({} tiers, session {})",
            device,
            tasks.len(),
            session
        );
        self.active = Some(ActiveSession {
            id: session,
            device,
            tasks,
        });
    }

    /// Cancels all polling tasks and waits for them to finish. Cached entries
    /// are left untouched. Returns the device that was being polled.
    pub async fn stop(&mut self) -> Option<DeviceId> {
        let previous = self.cancel_tasks().await;
        self.state.send_replace(DashboardSnapshot::default());
        previous
    }

    async fn cancel_tasks(&mut self) -> Option<DeviceId> {
        let session = self.active.take()?;

        for task in &session.tasks {
            task.abort();
        }
        for task in session.tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => error!("Polling task for {} panicked: {}", session.device, e),
            }
        }

        info!("Stopped polling {} (session {})", session.device, session.id);
        Some(session.device)
    }
}

impl Drop for PollingDriver {
    fn drop(&mut self) {
        if let Some(session) = self.active.take() {
            for task in session.tasks {
                task.abort();
            }
        }
    }
}

async fn poll_tier(
    client: Arc<TelemetryClient>,
    state: Arc<watch::Sender<DashboardSnapshot>>,
    session: Uuid,
    device: DeviceId,
    tier: Tier,
    period: Duration,
) {
    debug!("Starting {} poller for {} every {:?}", tier, device, period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let result = client.get(tier, &device).await;
        if let Err(e) = &result {
            warn!("{} poll for {} failed: {}", tier, device, e);
        }

        state.send_if_modified(|snapshot| {
            if snapshot.session != Some(session) {
                return false;
            }
            snapshot.apply(tier, result);
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::FakeSource;
    use crate::client::tests::point;
    use crate::config::ClientConfig;
    use crate::source::TelemetrySource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// Answers every request after a fixed delay.
    struct LaggingSource {
        latency: Duration,
        latest_calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetrySource for LaggingSource {
        async fn historical(&self, _device: &DeviceId) -> Result<Vec<TelemetryPoint>> {
            sleep(self.latency).await;
            Ok(vec![point(20.0)])
        }

        async fn realtime(&self, _device: &DeviceId) -> Result<Vec<TelemetryPoint>> {
            sleep(self.latency).await;
            Ok(vec![point(20.0)])
        }

        async fn latest(&self, _device: &DeviceId) -> Result<Option<TelemetryPoint>> {
            self.latest_calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.latency).await;
            Ok(Some(point(21.0)))
        }
    }

    fn driver(plan: PollPlan) -> (Arc<FakeSource>, PollingDriver) {
        let source = Arc::new(FakeSource::default());
        let client = Arc::new(TelemetryClient::new(
            source.clone(),
            &ClientConfig::default(),
        ));
        (source, PollingDriver::new(client, plan))
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_fetch_on_start() {
        let (source, mut driver) = driver(PollPlan::default());

        driver.start(DeviceId::from("dev1")).await;
        sleep(Duration::from_millis(10)).await;

        assert_eq!(source.count(Tier::Latest, "dev1"), 1);
        assert_eq!(source.count(Tier::Realtime, "dev1"), 1);
        assert_eq!(source.count(Tier::Historical, "dev1"), 1);

        let snapshot = driver.snapshot();
        assert_eq!(snapshot.device, Some(DeviceId::from("dev1")));
        assert_eq!(snapshot.latest.status, TierStatus::Ready);
        assert_eq!(snapshot.realtime.status, TierStatus::NoData);
        assert_eq!(snapshot.historical.data.as_ref().map(|d| d.len()), Some(2));
        assert!(!snapshot.has_errors());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_tier_keeps_its_own_interval() {
        let (source, mut driver) = driver(PollPlan::default());

        driver.start(DeviceId::from("dev1")).await;
        sleep(Duration::from_millis(10_500)).await;

        // Ticks at 0, 2, 4, 6, 8, 10 / 0, 3, 6, 9 / 0, 10
        assert_eq!(source.count(Tier::Latest, "dev1"), 6);
        assert_eq!(source.count(Tier::Realtime, "dev1"), 4);
        assert_eq!(source.count(Tier::Historical, "dev1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_latency_does_not_skip_ticks() {
        let source = Arc::new(LaggingSource {
            latency: Duration::from_millis(100),
            latest_calls: AtomicUsize::new(0),
        });
        let client = Arc::new(TelemetryClient::new(
            source.clone(),
            &ClientConfig::default(),
        ));
        let mut driver = PollingDriver::new(client, PollPlan::only(&[Tier::Latest]));

        driver.start(DeviceId::from("dev1")).await;
        sleep(Duration::from_millis(10_500)).await;

        // Ticks at 0, 2, 4, 6, 8, 10 each reach the network
        assert_eq!(source.latest_calls.load(Ordering::SeqCst), 6);
        assert_eq!(driver.snapshot().latest.status, TierStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_stops_old_device() {
        let (source, mut driver) = driver(PollPlan::default());

        driver.start(DeviceId::from("dev1")).await;
        sleep(Duration::from_millis(2500)).await;
        assert!(source.count(Tier::Latest, "dev1") >= 2);

        driver
            .switch_target(DeviceId::from("dev2"), ClearScope::Device)
            .await;
        let dev1_calls = source
            .calls()
            .iter()
            .filter(|(_, d)| d.as_str() == "dev1")
            .count();

        // Old device evicted from every tier
        let dev1 = DeviceId::from("dev1");
        assert!(driver.client().latest_cache().peek(&dev1).is_none());
        assert!(driver.client().realtime_cache().peek(&dev1).is_none());
        assert!(driver.client().historical_cache().peek(&dev1).is_none());

        sleep(Duration::from_secs(12)).await;

        let dev1_after = source
            .calls()
            .iter()
            .filter(|(_, d)| d.as_str() == "dev1")
            .count();
        assert_eq!(dev1_calls, dev1_after);
        assert!(source.count(Tier::Latest, "dev2") >= 6);
        assert_eq!(driver.target(), Some(&DeviceId::from("dev2")));
        assert_eq!(driver.snapshot().device, Some(DeviceId::from("dev2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_with_global_clear() {
        let (_source, mut driver) = driver(PollPlan::only(&[Tier::Historical]));
        let other = DeviceId::from("other");

        driver.client().historical(&other).await.unwrap();
        driver.start(DeviceId::from("dev1")).await;
        sleep(Duration::from_millis(10)).await;

        driver
            .switch_target(DeviceId::from("dev2"), ClearScope::All)
            .await;

        assert!(driver.client().historical_cache().peek(&other).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_polling() {
        let (source, mut driver) = driver(PollPlan::only(&[Tier::Latest]));
        source.set_failing(Tier::Latest, true);

        driver.start(DeviceId::from("dev1")).await;
        sleep(Duration::from_millis(10)).await;
        assert!(matches!(
            driver.snapshot().latest.status,
            TierStatus::Failed(_)
        ));
        assert!(driver.snapshot().has_errors());

        source.set_failing(Tier::Latest, false);
        sleep(Duration::from_millis(2000)).await;

        assert_eq!(driver.snapshot().latest.status, TierStatus::Ready);
        assert_eq!(source.count(Tier::Latest, "dev1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_all_tasks() {
        let (source, mut driver) = driver(PollPlan::default());

        driver.start(DeviceId::from("dev1")).await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(driver.stop().await, Some(DeviceId::from("dev1")));
        assert!(!driver.is_running());

        let calls = source.calls().len();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls().len(), calls);
        assert_eq!(driver.snapshot(), DashboardSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_new_session() {
        let (_source, mut driver) = driver(PollPlan::only(&[Tier::Latest]));
        let mut rx = driver.subscribe();

        driver.start(DeviceId::from("dev1")).await;
        rx.changed().await.unwrap();
        let first = rx.borrow_and_update().session;
        assert!(first.is_some());

        driver
            .switch_target(DeviceId::from("dev2"), ClearScope::Device)
            .await;
        let second = rx.borrow_and_update().session;
        assert!(second.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn test_plan_overrides_interval() {
        let plan = PollPlan::only(&[Tier::Latest, Tier::Historical])
            .with_interval(Tier::Latest, Duration::from_millis(500));

        let tiers: Vec<_> = plan.tiers().collect();
        assert_eq!(
            tiers,
            vec![
                (Tier::Latest, Duration::from_millis(500)),
                (Tier::Historical, Duration::from_secs(10)),
            ]
        );
    }
}
