//! Attribute reconciliation and periodic pollers
//!
//! Two independent pollers keep hub attributes in sync with the projector:
//! device status (power, mute, input) and the lamp timer. Each is owned by a
//! [`PollerController`] so restarting one never leaves a stale instance
//! running. Per-tick failures are logged and the next tick retries.

use crate::config::{ConfigStore, RuntimeConfig};
use crate::entity::{self, attr, PowerState};
use crate::registry::{Attributes, EntityRegistry};
use sdcp_protocol::{SdcpClient, DEFAULT_TIMEOUT};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const DEVICE_STATUS_POLLER: &str = "device_status_poller";
pub const LAMP_TIMER_POLLER: &str = "lamp_timer_poller";

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
    interval: Duration,
}

/// Owns at most one running instance of a named periodic task
pub struct PollerController {
    name: &'static str,
    running: Mutex<Option<Running>>,
}

impl PollerController {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Start ticking every `interval`, replacing any running instance.
    ///
    /// The first tick fires one interval after start. A zero interval
    /// leaves the poller stopped.
    pub async fn start<F, Fut>(&self, interval: Duration, tick: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            tracing::debug!("Stopping running {} before restart", self.name);
            Self::shutdown(previous).await;
        }

        if interval.is_zero() {
            tracing::info!("{} interval is 0, poller not started", self.name);
            return;
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let name = self.name;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = child.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    () = child.cancelled() => break,
                    () = tick() => {}
                }
            }
            tracing::debug!("{} stopped", name);
        });

        *running = Some(Running {
            token,
            handle,
            interval,
        });
        tracing::info!("Started {} with an interval of {:?}", self.name, interval);
    }

    /// Cancel the running instance and wait for it to finish
    pub async fn stop(&self) {
        if let Some(previous) = self.running.lock().await.take() {
            Self::shutdown(previous).await;
            tracing::info!("Stopped {}", self.name);
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Interval of the running instance
    pub async fn interval(&self) -> Option<Duration> {
        self.running.lock().await.as_ref().map(|r| r.interval)
    }

    async fn shutdown(running: Running) {
        running.token.cancel();
        if let Err(e) = running.handle.await {
            if !e.is_cancelled() {
                tracing::warn!("Poller task ended abnormally: {}", e);
            }
        }
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Hub is in standby, projector not queried
    Standby,
    /// Projector is off, lamp timer not queried
    PowerOff,
    /// No projector address or entity id configured
    NotConfigured,
    /// Queried state matches the registry
    Unchanged,
    /// Only these attributes were pushed
    Pushed(Attributes),
    Failed(String),
}

/// Queries the projector and pushes attribute changes to the registry
pub struct Reconciler {
    config: Arc<ConfigStore>,
    registry: Arc<dyn EntityRegistry>,
    timeout: Duration,
}

impl Reconciler {
    pub fn new(config: Arc<ConfigStore>, registry: Arc<dyn EntityRegistry>) -> Self {
        Self {
            config,
            registry,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn target(&self) -> Option<(RuntimeConfig, SdcpClient)> {
        let config = self.config.snapshot();
        if config.id.is_empty() {
            return None;
        }
        let client = SdcpClient::new(config.endpoint()?).with_timeout(self.timeout);
        Some((config, client))
    }

    /// Query power, mute and input and push whichever changed.
    ///
    /// A failed power query reports `UNKNOWN`, a failed mute query reports
    /// unmuted and a failed input query leaves the source untouched.
    pub async fn poll_device_status(&self) -> PollOutcome {
        if self.config.is_standby() {
            tracing::debug!("Hub in standby, skip device status poll");
            return PollOutcome::Standby;
        }
        let Some((config, client)) = self.target() else {
            return PollOutcome::NotConfigured;
        };

        let state = match client.get_power().await {
            Ok(on) => PowerState::from_bool(on),
            Err(e) => {
                tracing::warn!("Can't get power status from projector, set to unknown: {}", e);
                PowerState::Unknown
            }
        };
        let muted = client.get_muting().await.unwrap_or_else(|e| {
            tracing::warn!("Can't get mute status from projector, set to false: {}", e);
            false
        });
        let source = match client.get_input().await {
            Ok(input) => Some(input.map_or(Value::Null, |i| json!(i.label()))),
            Err(e) => {
                tracing::warn!("Can't get input from projector: {}", e);
                None
            }
        };

        let mut current = Attributes::new();
        current.insert(attr::STATE.to_string(), state.into());
        current.insert(attr::MUTED.to_string(), json!(muted));
        if let Some(source) = source {
            current.insert(attr::SOURCE.to_string(), source);
        }

        let Some(stored) = self.registry.attributes(&config.id) else {
            tracing::warn!(
                "Entity {} not found. Please make sure it's added as a configured entity",
                config.id
            );
            return PollOutcome::Failed(format!("entity {} not found", config.id));
        };

        let changed = diff(&stored, current);
        if changed.is_empty() {
            tracing::debug!("No entity attributes to update for {}", config.id);
            return PollOutcome::Unchanged;
        }

        if !self.registry.update_attributes(&config.id, changed.clone()) {
            return PollOutcome::Failed(format!("entity {} not found", config.id));
        }
        if let Some(state) = changed.get(attr::STATE) {
            let mut remote = Attributes::new();
            remote.insert(attr::STATE.to_string(), state.clone());
            self.registry.update_attributes(&config.remote_id(), remote);
        }
        tracing::info!("Updated entity attributes {:?} for {}", changed, config.id);
        PollOutcome::Pushed(changed)
    }

    /// Query the lamp timer and push it when it changed.
    ///
    /// Skipped while the last known power state is off.
    pub async fn poll_lamp_hours(&self) -> PollOutcome {
        if self.config.is_standby() {
            tracing::debug!("Hub in standby, skip lamp timer poll");
            return PollOutcome::Standby;
        }
        let Some((config, client)) = self.target() else {
            return PollOutcome::NotConfigured;
        };

        let power = self
            .registry
            .attributes(&config.id)
            .and_then(|a| a.get(attr::STATE).cloned());
        if power == Some(PowerState::Off.into()) {
            tracing::debug!("Projector is off, skip lamp timer poll");
            return PollOutcome::PowerOff;
        }

        self.push_lamp_hours(&config, &client).await
    }

    /// Query the lamp timer regardless of the last known power state
    pub async fn refresh_lamp_hours(&self) -> PollOutcome {
        let Some((config, client)) = self.target() else {
            return PollOutcome::NotConfigured;
        };
        self.push_lamp_hours(&config, &client).await
    }

    async fn push_lamp_hours(&self, config: &RuntimeConfig, client: &SdcpClient) -> PollOutcome {
        let hours = match client.get_lamp_hours().await {
            Ok(hours) => hours,
            Err(e) => {
                tracing::warn!("Can't get lamp hours from projector: {}", e);
                return PollOutcome::Failed(e.to_string());
            }
        };
        let value = json!(entity::lamp_hours_display(hours));

        let sensor_id = config.lamp_timer_id();
        let stored = self
            .registry
            .attributes(&sensor_id)
            .and_then(|a| a.get(attr::VALUE).cloned());
        if stored.as_ref() == Some(&value) {
            tracing::debug!("Lamp hours unchanged for {}", sensor_id);
            return PollOutcome::Unchanged;
        }

        let mut attributes = Attributes::new();
        attributes.insert(attr::STATE.to_string(), PowerState::On.into());
        attributes.insert(attr::VALUE.to_string(), value);
        attributes.insert(attr::UNIT.to_string(), json!(entity::LAMP_HOURS_UNIT));

        if !self.registry.update_attributes(&sensor_id, attributes.clone()) {
            tracing::warn!("Lamp timer entity {} not found", sensor_id);
            return PollOutcome::Failed(format!("entity {sensor_id} not found"));
        }
        tracing::info!("Updated lamp timer of {} to {} h", sensor_id, hours);
        PollOutcome::Pushed(attributes)
    }

    /// Query power and push it to the remote entity when it changed
    pub async fn refresh_remote_power(&self) -> PollOutcome {
        let Some((config, client)) = self.target() else {
            return PollOutcome::NotConfigured;
        };

        let state = match client.get_power().await {
            Ok(on) => PowerState::from_bool(on),
            Err(e) => {
                tracing::warn!("Can't get power status from projector, set to unknown: {}", e);
                PowerState::Unknown
            }
        };
        let mut current = Attributes::new();
        current.insert(attr::STATE.to_string(), state.into());

        let remote_id = config.remote_id();
        let Some(stored) = self.registry.attributes(&remote_id) else {
            tracing::warn!("Remote entity {} not found", remote_id);
            return PollOutcome::Failed(format!("entity {remote_id} not found"));
        };
        let changed = diff(&stored, current);
        if changed.is_empty() {
            return PollOutcome::Unchanged;
        }
        self.registry.update_attributes(&remote_id, changed.clone());
        tracing::info!("Updated remote state {:?} for {}", changed, remote_id);
        PollOutcome::Pushed(changed)
    }
}

/// Attributes in `current` whose value differs from `stored`
fn diff(stored: &Attributes, current: Attributes) -> Attributes {
    current
        .into_iter()
        .filter(|(key, value)| stored.get(key) != Some(value))
        .collect()
}

/// The device status and lamp timer pollers of one projector
pub struct Pollers {
    reconciler: Arc<Reconciler>,
    device_status: PollerController,
    lamp_timer: PollerController,
}

impl Pollers {
    #[must_use]
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            device_status: PollerController::new(DEVICE_STATUS_POLLER),
            lamp_timer: PollerController::new(LAMP_TIMER_POLLER),
        }
    }

    #[must_use]
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    #[must_use]
    pub fn device_status(&self) -> &PollerController {
        &self.device_status
    }

    #[must_use]
    pub fn lamp_timer(&self) -> &PollerController {
        &self.lamp_timer
    }

    pub async fn start_device_status(&self, interval: Duration) {
        let reconciler = self.reconciler.clone();
        self.device_status
            .start(interval, move || {
                let reconciler = reconciler.clone();
                async move {
                    reconciler.poll_device_status().await;
                }
            })
            .await;
    }

    pub async fn start_lamp_timer(&self, interval: Duration) {
        let reconciler = self.reconciler.clone();
        self.lamp_timer
            .start(interval, move || {
                let reconciler = reconciler.clone();
                async move {
                    reconciler.poll_lamp_hours().await;
                }
            })
            .await;
    }

    /// (Re)start both pollers with the configured intervals
    pub async fn start_all(&self, config: &RuntimeConfig) {
        self.start_device_status(Duration::from_secs(config.mp_poller_interval))
            .await;
        self.start_lamp_timer(Duration::from_secs(config.lt_poller_interval))
            .await;
    }

    pub async fn stop_all(&self) {
        self.device_status.stop().await;
        self.lamp_timer.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, Harness, MP_ID};
    use sdcp_protocol::{ErrorCode, Item, PowerStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reconciler(h: &Harness) -> Reconciler {
        Reconciler::new(h.config.clone(), h.registry.clone())
    }

    fn seed(h: &Harness, entity_id: &str, pairs: Value) {
        let attributes = pairs.as_object().cloned().unwrap_or_default();
        assert!(h.registry.update_attributes(entity_id, attributes));
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_ticks_after_interval() {
        let controller = PollerController::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        controller
            .start(Duration::from_millis(100), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert!(controller.is_running().await);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!((2..=4).contains(&count.load(Ordering::SeqCst)));

        controller.stop().await;
        assert!(!controller.is_running().await);
        let frozen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_restart_replaces_instance() {
        let controller = PollerController::new("test");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        controller
            .start(Duration::from_millis(100), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let counter = second.clone();
        controller
            .start(Duration::from_millis(100), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        let first_frozen = first.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(550)).await;

        assert_eq!(first.load(Ordering::SeqCst), first_frozen);
        assert!(second.load(Ordering::SeqCst) >= 4);
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_stop_cancels_inflight_tick() {
        let controller = PollerController::new("test");
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();
        controller
            .start(Duration::from_millis(10), move || {
                let counter = counter.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        controller.stop().await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert!(!controller.is_running().await);
    }

    #[tokio::test]
    async fn test_zero_interval_disables() {
        let controller = PollerController::new("test");
        controller.start(Duration::ZERO, || async {}).await;
        assert!(!controller.is_running().await);
        assert_eq!(controller.interval().await, None);
    }

    #[tokio::test]
    async fn test_unchanged_state_pushes_nothing() {
        let h = harness("poll-unchanged").await;
        h.mock.set_value(Item::StatusPower, PowerStatus::PowerOn as u16);
        seed(&h, MP_ID, json!({ "state": "ON", "muted": false, "source": "HDMI 1" }));
        let writes = h.registry.update_count();

        assert_eq!(reconciler(&h).poll_device_status().await, PollOutcome::Unchanged);
        assert_eq!(h.registry.update_count(), writes);
    }

    #[tokio::test]
    async fn test_single_change_pushes_single_field() {
        let h = harness("poll-single").await;
        h.mock.set_value(Item::StatusPower, PowerStatus::PowerOn as u16);
        h.mock.set_value(Item::PictureMuting, 1);
        seed(&h, MP_ID, json!({ "state": "ON", "muted": false, "source": "HDMI 1" }));

        let outcome = reconciler(&h).poll_device_status().await;
        let expected = json!({ "muted": true }).as_object().cloned().unwrap();
        assert_eq!(outcome, PollOutcome::Pushed(expected));

        assert_eq!(reconciler(&h).poll_device_status().await, PollOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_power_change_mirrors_to_remote() {
        let h = harness("poll-remote").await;
        h.mock.set_value(Item::StatusPower, PowerStatus::Cooling as u16);
        reconciler(&h).poll_device_status().await;

        assert_eq!(h.registry.attributes(MP_ID).unwrap()[attr::STATE], json!("OFF"));
        assert_eq!(
            h.registry.attributes("remote-mp-1").unwrap()[attr::STATE],
            json!("OFF")
        );
    }

    #[tokio::test]
    async fn test_query_failures_fall_back() {
        let h = harness("poll-fallback").await;
        seed(&h, MP_ID, json!({ "state": "ON", "muted": true, "source": "HDMI 2" }));
        h.mock.reject(Item::StatusPower, ErrorCode::NotApplicableItem);
        h.mock.reject(Item::PictureMuting, ErrorCode::NotApplicableItem);
        h.mock.reject(Item::Input, ErrorCode::NotApplicableItem);

        reconciler(&h).poll_device_status().await;
        let stored = h.registry.attributes(MP_ID).unwrap();
        assert_eq!(stored[attr::STATE], json!("UNKNOWN"));
        assert_eq!(stored[attr::MUTED], json!(false));
        assert_eq!(stored[attr::SOURCE], json!("HDMI 2"));
    }

    #[tokio::test]
    async fn test_standby_skips_queries() {
        let h = harness("poll-standby").await;
        h.config.set_standby(true);
        let r = reconciler(&h);

        assert_eq!(r.poll_device_status().await, PollOutcome::Standby);
        assert_eq!(r.poll_lamp_hours().await, PollOutcome::Standby);
        assert_eq!(h.mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_lamp_poll_skipped_when_off() {
        let h = harness("poll-lamp-off").await;
        seed(&h, MP_ID, json!({ "state": "OFF" }));

        assert_eq!(reconciler(&h).poll_lamp_hours().await, PollOutcome::PowerOff);
        assert_eq!(h.mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_lamp_hours_pushed_on_change() {
        let h = harness("poll-lamp").await;
        seed(&h, MP_ID, json!({ "state": "ON" }));
        h.mock.set_value(Item::StatusLampTimer, 1234);
        let r = reconciler(&h);

        assert!(matches!(r.poll_lamp_hours().await, PollOutcome::Pushed(_)));
        let sensor = h.registry.attributes("lamptimer-mp-1").unwrap();
        assert_eq!(sensor[attr::VALUE], json!("1234 h"));
        assert_eq!(sensor[attr::UNIT], json!("h"));
        assert_eq!(sensor[attr::STATE], json!("ON"));

        assert_eq!(r.poll_lamp_hours().await, PollOutcome::Unchanged);
        h.mock.set_value(Item::StatusLampTimer, 1235);
        assert!(matches!(r.poll_lamp_hours().await, PollOutcome::Pushed(_)));
    }

    #[tokio::test]
    async fn test_lamp_failure_is_swallowed() {
        let h = harness("poll-lamp-fail").await;
        h.mock.reject(Item::StatusLampTimer, ErrorCode::TimeoutComm);
        assert!(matches!(
            reconciler(&h).poll_lamp_hours().await,
            PollOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_lamp_refresh_ignores_power_gate() {
        let h = harness("poll-lamp-refresh").await;
        seed(&h, MP_ID, json!({ "state": "OFF" }));
        h.mock.set_value(Item::StatusLampTimer, 77);

        assert!(matches!(
            reconciler(&h).refresh_lamp_hours().await,
            PollOutcome::Pushed(_)
        ));
        let sensor = h.registry.attributes("lamptimer-mp-1").unwrap();
        assert_eq!(sensor[attr::VALUE], json!("77 h"));
    }

    #[tokio::test]
    async fn test_remote_power_refresh() {
        let h = harness("poll-remote-refresh").await;
        h.mock.set_value(Item::StatusPower, PowerStatus::PowerOn as u16);
        let r = reconciler(&h);

        assert!(matches!(r.refresh_remote_power().await, PollOutcome::Pushed(_)));
        assert_eq!(
            h.registry.attributes("remote-mp-1").unwrap()[attr::STATE],
            json!("ON")
        );
        assert_eq!(r.refresh_remote_power().await, PollOutcome::Unchanged);

        h.mock.reject(Item::StatusPower, ErrorCode::NotApplicableItem);
        r.refresh_remote_power().await;
        assert_eq!(
            h.registry.attributes("remote-mp-1").unwrap()[attr::STATE],
            json!("UNKNOWN")
        );
    }
}
