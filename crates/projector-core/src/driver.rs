//! Hub event handling
//!
//! [`Driver`] ties the config store, registry, dispatcher, pollers and setup
//! flow together and exposes one method per hub event.

use crate::config::ConfigStore;
use crate::dispatcher::Dispatcher;
use crate::entity;
use crate::poller::{Pollers, Reconciler};
use crate::registry::{Attributes, EntityRegistry, StatusCode};
use crate::setup::SetupFlow;
use std::sync::Arc;

/// One projector integration
pub struct Driver {
    config: Arc<ConfigStore>,
    registry: Arc<dyn EntityRegistry>,
    dispatcher: Dispatcher,
    pollers: Arc<Pollers>,
    setup: SetupFlow,
}

impl Driver {
    pub fn new(config: Arc<ConfigStore>, registry: Arc<dyn EntityRegistry>) -> Self {
        let reconciler = Arc::new(Reconciler::new(config.clone(), registry.clone()));
        let pollers = Arc::new(Pollers::new(reconciler.clone()));
        let dispatcher =
            Dispatcher::new(config.clone(), registry.clone()).with_reconciler(reconciler);
        let setup = SetupFlow::new(config.clone(), registry.clone(), pollers.clone());

        Self {
            config,
            registry,
            dispatcher,
            pollers,
            setup,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    #[must_use]
    pub fn setup(&self) -> &SetupFlow {
        &self.setup
    }

    #[must_use]
    pub fn pollers(&self) -> &Pollers {
        &self.pollers
    }

    /// Register the entities and start polling when setup was completed before
    pub async fn startup(&self) {
        let config = self.config.snapshot();
        if !config.setup_complete {
            tracing::info!("Setup not completed, waiting for driver setup");
            return;
        }

        tracing::info!("Restoring {} ({}) at {}", config.name, config.id, config.ip);
        for definition in entity::all(&config.id, &config.name) {
            self.registry.register_entity(definition);
        }
        self.pollers.start_all(&config).await;
    }

    pub fn enter_standby(&self) {
        tracing::debug!("Hub entered standby, pausing polls");
        self.config.set_standby(true);
    }

    pub fn exit_standby(&self) {
        tracing::debug!("Hub left standby");
        self.config.set_standby(false);
    }

    /// The hub subscribed to entities, refresh their attributes right away
    pub async fn subscribe_entities(&self, entity_ids: &[String]) {
        self.config.set_standby(false);

        let config = self.config.snapshot();
        if !config.setup_complete {
            return;
        }

        let reconciler = self.pollers.reconciler();
        let lamp_timer_id = config.lamp_timer_id();
        let remote_id = config.remote_id();
        for entity_id in entity_ids {
            if *entity_id == config.id {
                tracing::debug!("Subscribed to {}, updating device status", entity_id);
                let outcome = reconciler.poll_device_status().await;
                tracing::debug!("Device status refresh: {:?}", outcome);
            } else if *entity_id == lamp_timer_id {
                tracing::debug!("Subscribed to {}, updating lamp hours", entity_id);
                let outcome = reconciler.poll_lamp_hours().await;
                tracing::debug!("Lamp hours refresh: {:?}", outcome);
            } else if *entity_id == remote_id {
                tracing::debug!("Subscribed to {}, updating power state", entity_id);
                let outcome = reconciler.refresh_remote_power().await;
                tracing::debug!("Remote power refresh: {:?}", outcome);
            }
        }
    }

    /// Route a hub command to the media player or remote handler
    pub async fn handle_command(
        &self,
        entity_id: &str,
        command: &str,
        params: Option<&Attributes>,
    ) -> StatusCode {
        let config = self.config.snapshot();
        if !config.id.is_empty() && entity_id == config.id {
            self.dispatcher.execute(entity_id, command, params).await
        } else if !config.id.is_empty() && entity_id == config.remote_id() {
            self.dispatcher
                .execute_remote(entity_id, command, params)
                .await
        } else if !config.id.is_empty() && entity_id == config.lamp_timer_id() {
            tracing::warn!("{} does not accept commands", entity_id);
            StatusCode::NotImplemented
        } else {
            tracing::warn!("Command {} for unknown entity {}", command, entity_id);
            StatusCode::BadRequest
        }
    }

    pub async fn shutdown(&self) {
        tracing::info!("Stopping pollers");
        self.pollers.stop_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::entity::attr;
    use crate::registry::InMemoryRegistry;
    use crate::testing::{harness, temp_path, Harness, MP_ID};
    use sdcp_protocol::{Item, PowerStatus};
    use serde_json::{json, Value};

    fn driver(h: &Harness) -> Driver {
        Driver::new(h.config.clone(), h.registry.clone())
    }

    #[tokio::test]
    async fn test_startup_without_setup() {
        let config = Arc::new(ConfigStore::new(temp_path("driver-fresh")));
        let registry = Arc::new(InMemoryRegistry::new());
        let driver = Driver::new(config, registry.clone());

        driver.startup().await;
        assert!(registry.get_states().is_empty());
        assert!(!driver.pollers().device_status().is_running().await);
    }

    #[tokio::test]
    async fn test_startup_restores_entities() {
        let config = RuntimeConfig {
            ip: "127.0.0.1".to_string(),
            id: "VPL-VW270-42".to_string(),
            name: "Sony VPL-VW270".to_string(),
            setup_complete: true,
            ..RuntimeConfig::default()
        };
        let config = Arc::new(ConfigStore::with_config(temp_path("driver-restore"), config));
        let registry = Arc::new(InMemoryRegistry::new());
        let driver = Driver::new(config, registry.clone());

        driver.startup().await;
        assert_eq!(registry.get_states().len(), 3);
        assert!(driver.pollers().device_status().is_running().await);
        assert!(driver.pollers().lamp_timer().is_running().await);

        driver.shutdown().await;
        assert!(!driver.pollers().device_status().is_running().await);
        assert!(!driver.pollers().lamp_timer().is_running().await);
    }

    #[tokio::test]
    async fn test_routes_media_player_and_remote() {
        let h = harness("driver-route").await;
        let driver = driver(&h);

        assert_eq!(driver.handle_command(MP_ID, "on", None).await, StatusCode::Ok);
        assert_eq!(
            h.mock.value(Item::StatusPower),
            Some(PowerStatus::PowerOn as u16)
        );

        let remote_id = entity::remote_id(MP_ID);
        assert_eq!(
            driver.handle_command(&remote_id, "off", None).await,
            StatusCode::Ok
        );
        assert_eq!(
            h.mock.value(Item::StatusPower),
            Some(PowerStatus::Standby as u16)
        );
        assert_eq!(
            h.registry.attributes(&remote_id).unwrap()[attr::STATE],
            json!("OFF")
        );
    }

    #[tokio::test]
    async fn test_unknown_and_sensor_entities() {
        let h = harness("driver-unknown").await;
        let driver = driver(&h);

        assert_eq!(
            driver.handle_command("other", "on", None).await,
            StatusCode::BadRequest
        );
        assert_eq!(
            driver
                .handle_command(&entity::lamp_timer_id(MP_ID), "on", None)
                .await,
            StatusCode::NotImplemented
        );
        assert_eq!(h.mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_standby_flags() {
        let h = harness("driver-standby").await;
        let driver = driver(&h);

        driver.enter_standby();
        assert!(h.config.is_standby());
        driver.exit_standby();
        assert!(!h.config.is_standby());
    }

    #[tokio::test]
    async fn test_subscribe_refreshes_attributes() {
        let h = harness("driver-subscribe").await;
        h.mock
            .set_value(Item::StatusPower, PowerStatus::PowerOn as u16);
        h.mock.set_value(Item::StatusLampTimer, 321);
        let driver = driver(&h);
        driver.enter_standby();

        driver
            .subscribe_entities(&[MP_ID.to_string(), entity::lamp_timer_id(MP_ID)])
            .await;

        assert!(!h.config.is_standby());
        let attributes = h.registry.attributes(MP_ID).unwrap();
        assert_eq!(attributes[attr::STATE], json!("ON"));
        assert_eq!(attributes[attr::SOURCE], json!("HDMI 1"));

        let sensor = h.registry.attributes(&entity::lamp_timer_id(MP_ID)).unwrap();
        assert_eq!(sensor[attr::VALUE], Value::from("321 h"));
    }

    #[tokio::test]
    async fn test_subscribe_refreshes_remote_power() {
        let h = harness("driver-subscribe-remote").await;
        h.mock
            .set_value(Item::StatusPower, PowerStatus::PowerOn as u16);
        let driver = driver(&h);
        let remote_id = entity::remote_id(MP_ID);

        driver.subscribe_entities(&[remote_id.clone()]).await;

        assert_eq!(
            h.registry.attributes(&remote_id).unwrap()[attr::STATE],
            json!("ON")
        );
        assert_eq!(h.mock.request_count(), 1);
    }
}
