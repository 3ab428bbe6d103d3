//! Setup and reconfiguration flow
//!
//! ```text
//! NotStarted -> AwaitingUserInput -> Probing -> Complete
//!                      ^                |
//!                      +---- error -----+
//! ```
//!
//! A reconfiguration re-enters `AwaitingUserInput` while the stored
//! `setup_complete` flag stays untouched until the new probe succeeds.

use crate::config::{ConfigStore, RuntimeConfig};
use crate::entity;
use crate::error::SetupError;
use crate::poller::Pollers;
use crate::registry::EntityRegistry;
use sdcp_protocol::{
    discover, discover_host, AdvertisementInfo, ProjectorEndpoint, ProtocolError, SdcpClient,
    DEFAULT_TIMEOUT, DISCOVERY_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Setup progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupState {
    NotStarted,
    AwaitingUserInput,
    Probing,
    Complete,
}

/// Protocol and polling tunables from the advanced setup page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedSettings {
    pub sdcp_port: u16,
    pub sdap_port: u16,
    pub pjtalk_community: String,
    pub mp_poller_interval: u64,
    pub lt_poller_interval: u64,
}

impl From<&RuntimeConfig> for AdvancedSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            sdcp_port: config.sdcp_port,
            sdap_port: config.sdap_port,
            pjtalk_community: config.pjtalk_community.clone(),
            mp_poller_interval: config.mp_poller_interval,
            lt_poller_interval: config.lt_poller_interval,
        }
    }
}

/// Form shown to the user, pre-filled with the stored values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupForm {
    /// Blank means auto-discovery
    pub ip: String,
    pub advanced: AdvancedSettings,
}

/// Values submitted by the user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetupInput {
    /// Blank means auto-discovery
    #[serde(default)]
    pub ip: String,
    /// `None` keeps the stored advanced settings
    #[serde(default)]
    pub advanced: Option<AdvancedSettings>,
}

/// Drives first-run setup and reconfiguration
pub struct SetupFlow {
    config: Arc<ConfigStore>,
    registry: Arc<dyn EntityRegistry>,
    pollers: Arc<Pollers>,
    state: Mutex<SetupState>,
    discovery_timeout: Duration,
    probe_timeout: Duration,
}

impl SetupFlow {
    pub fn new(
        config: Arc<ConfigStore>,
        registry: Arc<dyn EntityRegistry>,
        pollers: Arc<Pollers>,
    ) -> Self {
        Self {
            config,
            registry,
            pollers,
            state: Mutex::new(SetupState::NotStarted),
            discovery_timeout: DISCOVERY_TIMEOUT,
            probe_timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub fn state(&self) -> SetupState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_state(&self, state: SetupState) {
        tracing::debug!("Setup state -> {:?}", state);
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = state;
    }

    /// Begin setup and return the form to present
    pub fn start(&self, reconfigure: bool) -> SetupForm {
        if reconfigure {
            tracing::info!("Starting reconfiguration");
        } else {
            tracing::info!("Starting setup");
        }
        self.config.set_reconfiguring(reconfigure);
        self.set_state(SetupState::AwaitingUserInput);

        let config = self.config.snapshot();
        SetupForm {
            ip: config.ip.clone(),
            advanced: AdvancedSettings::from(&config),
        }
    }

    /// Cancel a running setup
    pub fn abort(&self) {
        tracing::info!("Setup aborted");
        self.config.set_reconfiguring(false);
        self.set_state(SetupState::NotStarted);
    }

    /// Validate the submitted values, probe the projector and complete setup.
    ///
    /// On failure the flow returns to `AwaitingUserInput` and the stored
    /// `setup_complete` flag is left as it was.
    pub async fn submit(&self, input: SetupInput) -> Result<(), SetupError> {
        if self.state() != SetupState::AwaitingUserInput {
            return Err(SetupError::Other(format!(
                "setup not awaiting input (state {:?})",
                self.state()
            )));
        }
        self.set_state(SetupState::Probing);

        match self.run(input).await {
            Ok(()) => {
                self.set_state(SetupState::Complete);
                tracing::info!("Setup complete");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Setup failed: {}", e);
                self.set_state(SetupState::AwaitingUserInput);
                Err(e)
            }
        }
    }

    async fn run(&self, input: SetupInput) -> Result<(), SetupError> {
        let current = self.config.snapshot();
        let settings = input
            .advanced
            .unwrap_or_else(|| AdvancedSettings::from(&current));
        let ip = input.ip.trim().to_string();

        if self.config.is_reconfiguring()
            && current.setup_complete
            && !ip.is_empty()
            && ip == current.ip
            && settings.sdcp_port == current.sdcp_port
            && settings.sdap_port == current.sdap_port
            && settings.pjtalk_community == current.pjtalk_community
        {
            tracing::info!("Projector address and protocol settings unchanged, skip probing");
            return self.apply_intervals(&current, &settings).await;
        }

        let info = self.probe(&ip, &settings).await?;
        self.persist(&info, &settings).await?;

        let config = self.config.snapshot();
        for definition in entity::all(&config.id, &config.name) {
            self.registry.register_entity(definition);
        }
        self.pollers.start_all(&config).await;
        Ok(())
    }

    /// Resolve and verify the projector, returning its identity
    async fn probe(
        &self,
        ip: &str,
        settings: &AdvancedSettings,
    ) -> Result<AdvertisementInfo, SetupError> {
        if ip.is_empty() {
            tracing::info!("No IP entered, starting projector discovery");
            let info = discover(settings.sdap_port, "", self.discovery_timeout)
                .await
                .map_err(discovery_error)?;
            let client = self.client(&info.source_ip, settings);
            self.check_port(&client).await?;
            self.check_community(&client).await?;
            Ok(info)
        } else {
            ip.parse::<IpAddr>()
                .map_err(|_| SetupError::NotFound(format!("invalid IP address {ip}")))?;
            let client = self.client(ip, settings);
            self.check_port(&client).await?;
            self.check_community(&client).await?;

            tracing::info!("Waiting for SDAP advertisement from {} to identify the projector", ip);
            discover_host(ip, settings.sdap_port, "", self.discovery_timeout)
                .await
                .map_err(discovery_error)
        }
    }

    fn client(&self, ip: &str, settings: &AdvancedSettings) -> SdcpClient {
        let endpoint = ProjectorEndpoint::new(ip)
            .with_tcp_port(settings.sdcp_port)
            .with_udp_port(settings.sdap_port)
            .with_community(settings.pjtalk_community.clone());
        SdcpClient::new(endpoint).with_timeout(self.probe_timeout)
    }

    async fn check_port(&self, client: &SdcpClient) -> Result<(), SetupError> {
        client.probe().await.map_err(|e| {
            SetupError::ConnectionRefused(format!(
                "SDCP port {} not reachable: {}",
                client.endpoint().tcp_addr(),
                e
            ))
        })
    }

    /// A wrong community shows up as a rejected command, not a transport error
    async fn check_community(&self, client: &SdcpClient) -> Result<(), SetupError> {
        let hours = client.get_lamp_hours().await.map_err(|e| {
            SetupError::ConnectionRefused(format!(
                "test command failed, check the PJ Talk community: {e}"
            ))
        })?;
        tracing::debug!("Test command succeeded, lamp timer at {} h", hours);
        Ok(())
    }

    async fn persist(
        &self,
        info: &AdvertisementInfo,
        settings: &AdvancedSettings,
    ) -> Result<(), SetupError> {
        let store = &self.config;
        store.set("ip", info.source_ip.clone()).await?;
        store.set("id", info.entity_id()).await?;
        store.set("name", info.display_name()).await?;
        store.set("sdcp_port", settings.sdcp_port).await?;
        store.set("sdap_port", settings.sdap_port).await?;
        store
            .set("pjtalk_community", settings.pjtalk_community.clone())
            .await?;
        store
            .set("mp_poller_interval", settings.mp_poller_interval)
            .await?;
        store
            .set("lt_poller_interval", settings.lt_poller_interval)
            .await?;

        store.set_reconfiguring(false);
        store.set("setup_complete", true).await?;
        tracing::info!(
            "Stored projector {} ({}) at {}",
            info.display_name(),
            info.entity_id(),
            info.source_ip
        );
        Ok(())
    }

    /// Reconfiguration that only touched poll intervals
    async fn apply_intervals(
        &self,
        current: &RuntimeConfig,
        settings: &AdvancedSettings,
    ) -> Result<(), SetupError> {
        if settings.mp_poller_interval != current.mp_poller_interval {
            self.config
                .set("mp_poller_interval", settings.mp_poller_interval)
                .await?;
            self.pollers
                .start_device_status(Duration::from_secs(settings.mp_poller_interval))
                .await;
        }
        if settings.lt_poller_interval != current.lt_poller_interval {
            self.config
                .set("lt_poller_interval", settings.lt_poller_interval)
                .await?;
            self.pollers
                .start_lamp_timer(Duration::from_secs(settings.lt_poller_interval))
                .await;
        }
        self.config.set_reconfiguring(false);
        Ok(())
    }
}

fn discovery_error(err: ProtocolError) -> SetupError {
    match err {
        ProtocolError::Timeout => SetupError::Timeout(
            "no projector advertisement received, enter the IP address manually".to_string(),
        ),
        ProtocolError::Decoding(msg) => SetupError::NotFound(msg),
        other => SetupError::Other(other.to_string()),
    }
}
