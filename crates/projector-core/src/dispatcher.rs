//! Command dispatcher
//!
//! Resolves hub commands through the catalog, performs the SDCP requests
//! and reflects the resulting state into the registry. Each call is a single
//! attempt; retrying is up to the hub.

use crate::catalog::{self, CatalogEntry, CommandKind, Switch};
use crate::config::ConfigStore;
use crate::entity::{attr, PowerState};
use crate::error::DispatchError;
use crate::poller::Reconciler;
use crate::registry::{Attributes, EntityRegistry, StatusCode};
use sdcp_protocol::{CommandFrame, Input, Item, Request, SdcpClient, DEFAULT_TIMEOUT};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Remote entity command names
pub mod remote_cmd {
    pub const ON: &str = "on";
    pub const OFF: &str = "off";
    pub const TOGGLE: &str = "toggle";
    pub const SEND_CMD: &str = "send_cmd";
    pub const SEND_CMD_SEQUENCE: &str = "send_cmd_sequence";
}

/// Upper bound for the `repeat` parameter
pub const MAX_REPEAT: u64 = 100;

/// Repetition options of remote `send_cmd` / `send_cmd_sequence`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repeat {
    pub count: u64,
    pub delay: Duration,
    pub hold: Duration,
}

impl Repeat {
    /// Parse `repeat`, `delay` (ms) and `hold` (ms) from command params
    #[must_use]
    pub fn from_params(params: Option<&Attributes>) -> Self {
        let number = |key: &str| params.and_then(|p| p.get(key)).and_then(Value::as_u64);
        let requested = number("repeat").unwrap_or(1).max(1);
        let count = requested.min(MAX_REPEAT);
        if count < requested {
            tracing::warn!("repeat {} limited to {}", requested, MAX_REPEAT);
        }
        let mut delay = Duration::from_millis(number("delay").unwrap_or(0));
        if count == 1 && !delay.is_zero() {
            tracing::info!(
                "{:?} delay ignored as the command will not be repeated",
                delay
            );
            delay = Duration::ZERO;
        }
        Self {
            count,
            delay,
            hold: Duration::from_millis(number("hold").unwrap_or(0)),
        }
    }
}

/// Executes logical commands against the configured projector
pub struct Dispatcher {
    config: Arc<ConfigStore>,
    registry: Arc<dyn EntityRegistry>,
    reconciler: Option<Arc<Reconciler>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(config: Arc<ConfigStore>, registry: Arc<dyn EntityRegistry>) -> Self {
        Self {
            config,
            registry,
            reconciler: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Refresh the lamp timer through `reconciler` after power changes
    #[must_use]
    pub fn with_reconciler(mut self, reconciler: Arc<Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Override the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute a media player command and translate the outcome to a hub status
    pub async fn execute(
        &self,
        entity_id: &str,
        command: &str,
        params: Option<&Attributes>,
    ) -> StatusCode {
        match params {
            Some(params) => tracing::info!(
                "Received {} command with parameters {:?} for {}",
                command,
                params,
                entity_id
            ),
            None => tracing::info!("Received {} command for {}", command, entity_id),
        }

        match self.try_execute(entity_id, command, params).await {
            Ok(()) => StatusCode::Ok,
            Err(e) => {
                tracing::error!("Command {} for {} failed: {}", command, entity_id, e);
                e.status()
            }
        }
    }

    /// Execute a logical command
    pub async fn try_execute(
        &self,
        entity_id: &str,
        command: &str,
        params: Option<&Attributes>,
    ) -> Result<(), DispatchError> {
        let entry = catalog::lookup(command)
            .ok_or_else(|| DispatchError::NotImplemented(command.to_string()))?;
        tracing::debug!("{} for {} resolved to {:?}", command, entity_id, entry.kind);

        // Validate parameters before touching the network
        let source = match entry.kind {
            CommandKind::SelectSource => Some(source_param(params)?),
            CommandKind::Input(input) => Some(input),
            _ => None,
        };

        let client = self.client()?;
        match entry.kind {
            CommandKind::Power(switch) => {
                let on = match switch {
                    Switch::On => true,
                    Switch::Off => false,
                    Switch::Toggle => !client.get_power().await?,
                };
                client.set_power(on).await?;
                self.push_power(PowerState::from_bool(on));
                self.refresh_lamp_hours().await;
            }
            CommandKind::Mute(switch) => {
                let muted = match switch {
                    Switch::On => true,
                    Switch::Off => false,
                    Switch::Toggle => !client.get_muting().await?,
                };
                client.set_muting(muted).await?;
                self.push_media_player(attr::MUTED, json!(muted));
            }
            CommandKind::SelectSource | CommandKind::Input(_) => {
                if let Some(input) = source {
                    client.set_input(input).await?;
                    self.push_media_player(attr::SOURCE, json!(input.label()));
                }
            }
            CommandKind::Setting { item, value } => {
                client
                    .send(request(entry, CommandFrame::set(item.id(), value)))
                    .await?;
            }
            CommandKind::HdrToggle => {
                let current = client.get_hdr().await?;
                let next = current.toggled();
                tracing::debug!("Toggle HDR from {:?} to {:?}", current, next);
                client.set(Item::Hdr, next as u16).await?;
            }
            CommandKind::Ir(code) => {
                client
                    .send(request(entry, CommandFrame::bare(code.id())))
                    .await?;
            }
        }

        Ok(())
    }

    /// Execute a remote entity command
    pub async fn execute_remote(
        &self,
        entity_id: &str,
        command: &str,
        params: Option<&Attributes>,
    ) -> StatusCode {
        tracing::info!("Received remote {} command for {}", command, entity_id);

        let result = match command {
            remote_cmd::ON | remote_cmd::OFF | remote_cmd::TOGGLE => {
                self.try_execute(entity_id, command, params).await
            }
            remote_cmd::SEND_CMD => {
                let Some(name) = params.and_then(|p| p.get("command")).and_then(Value::as_str) else {
                    tracing::error!("send_cmd without a command parameter");
                    return StatusCode::BadRequest;
                };
                self.send_repeated(entity_id, name, Repeat::from_params(params))
                    .await
            }
            remote_cmd::SEND_CMD_SEQUENCE => {
                let Some(sequence) = params
                    .and_then(|p| p.get("sequence"))
                    .and_then(Value::as_array)
                else {
                    tracing::error!("send_cmd_sequence without a sequence parameter");
                    return StatusCode::BadRequest;
                };
                tracing::info!("Command sequence: {:?}", sequence);
                let repeat = Repeat::from_params(params);
                let mut result = Ok(());
                for name in sequence {
                    let Some(name) = name.as_str() else {
                        result = Err(DispatchError::BadRequest(format!(
                            "sequence entry {name} is not a string"
                        )));
                        break;
                    };
                    result = self.send_repeated(entity_id, name, repeat).await;
                    if result.is_err() {
                        break;
                    }
                }
                result
            }
            _ => {
                tracing::info!("Unsupported remote command {} for {}", command, entity_id);
                return StatusCode::BadRequest;
            }
        };

        match result {
            Ok(()) => StatusCode::Ok,
            Err(e) => {
                tracing::error!("Remote command {} for {} failed: {}", command, entity_id, e);
                e.status()
            }
        }
    }

    async fn send_repeated(
        &self,
        entity_id: &str,
        command: &str,
        repeat: Repeat,
    ) -> Result<(), DispatchError> {
        for round in 1..=repeat.count {
            if repeat.count > 1 {
                tracing::debug!("Round {} for command {}", round, command);
            }

            let result = if repeat.hold.is_zero() {
                self.try_execute(entity_id, command, None).await
            } else {
                self.hold(entity_id, command, repeat.hold).await
            };
            if let Err(e) = result {
                if repeat.count > 1 {
                    tracing::warn!(
                        "Command {} failed, skipping remaining {} repetitions",
                        command,
                        repeat.count - round
                    );
                }
                return Err(e);
            }

            if !repeat.delay.is_zero() {
                tokio::time::sleep(repeat.delay).await;
            }
        }
        Ok(())
    }

    /// Re-send `command` back to back until `hold` has elapsed
    async fn hold(&self, entity_id: &str, command: &str, hold: Duration) -> Result<(), DispatchError> {
        let start = Instant::now();
        while start.elapsed() < hold {
            self.try_execute(entity_id, command, None).await?;
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    fn client(&self) -> Result<SdcpClient, DispatchError> {
        let endpoint = self.config.endpoint().ok_or_else(|| {
            DispatchError::NotConfigured("no projector address configured".to_string())
        })?;
        Ok(SdcpClient::new(endpoint).with_timeout(self.timeout))
    }

    async fn refresh_lamp_hours(&self) {
        if let Some(reconciler) = &self.reconciler {
            let outcome = reconciler.refresh_lamp_hours().await;
            tracing::debug!("Lamp hours refresh after power change: {:?}", outcome);
        }
    }

    /// Mute and source always belong to the media player, whichever entity sent the command
    fn push_media_player(&self, key: &str, value: Value) {
        let config = self.config.snapshot();
        self.push(&config.id, key, value);
    }

    /// Power changes are mirrored to the media player and its remote
    fn push_power(&self, state: PowerState) {
        let config = self.config.snapshot();
        self.push(&config.id, attr::STATE, state.into());
        self.push(&config.remote_id(), attr::STATE, state.into());
    }

    fn push(&self, entity_id: &str, key: &str, value: Value) {
        let mut attributes = Attributes::new();
        attributes.insert(key.to_string(), value);
        if !self.registry.update_attributes(entity_id, attributes) {
            tracing::warn!(
                "Entity {} not found. Please make sure it's added as a configured entity",
                entity_id
            );
        }
    }
}

fn request(entry: &CatalogEntry, frame: CommandFrame) -> Request {
    Request {
        frame,
        expects_response: entry.expects_response,
    }
}

fn source_param(params: Option<&Attributes>) -> Result<Input, DispatchError> {
    let source = params
        .and_then(|p| p.get("source"))
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::BadRequest("missing source parameter".to_string()))?;
    Input::from_label(source)
        .ok_or_else(|| DispatchError::BadRequest(format!("Unknown source: {source}")))
}
