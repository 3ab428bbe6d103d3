//! Runtime configuration store
//!
//! Holds the persisted [`RuntimeConfig`] plus the transient reconfiguring
//! and standby flags. Every persisted change is written back to the JSON
//! config file as a read-modify-write of that single key.

use crate::entity;
use crate::error::ConfigError;
use crate::persistence;
use sdcp_protocol::{ProjectorEndpoint, DEFAULT_COMMUNITY, DEFAULT_SDAP_PORT, DEFAULT_SDCP_PORT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::Mutex;

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.json";

/// Default device status poll interval in seconds
pub const DEFAULT_MP_POLLER_INTERVAL: u64 = 20;

/// Default lamp timer poll interval in seconds
pub const DEFAULT_LT_POLLER_INTERVAL: u64 = 1800;

/// Persisted driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub ip: String,
    pub id: String,
    pub name: String,
    pub setup_complete: bool,
    pub sdcp_port: u16,
    pub sdap_port: u16,
    pub pjtalk_community: String,
    /// Seconds between device status polls, 0 disables
    pub mp_poller_interval: u64,
    /// Seconds between lamp timer polls, 0 disables
    pub lt_poller_interval: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ip: String::new(),
            id: String::new(),
            name: String::new(),
            setup_complete: false,
            sdcp_port: DEFAULT_SDCP_PORT,
            sdap_port: DEFAULT_SDAP_PORT,
            pjtalk_community: DEFAULT_COMMUNITY.to_string(),
            mp_poller_interval: DEFAULT_MP_POLLER_INTERVAL,
            lt_poller_interval: DEFAULT_LT_POLLER_INTERVAL,
        }
    }
}

impl RuntimeConfig {
    /// Projector endpoint, `None` until an address is configured
    #[must_use]
    pub fn endpoint(&self) -> Option<ProjectorEndpoint> {
        if self.ip.is_empty() {
            return None;
        }
        Some(
            ProjectorEndpoint::new(self.ip.clone())
                .with_tcp_port(self.sdcp_port)
                .with_udp_port(self.sdap_port)
                .with_community(self.pjtalk_community.clone()),
        )
    }

    #[must_use]
    pub fn remote_id(&self) -> String {
        entity::remote_id(&self.id)
    }

    #[must_use]
    pub fn lamp_timer_id(&self) -> String {
        entity::lamp_timer_id(&self.id)
    }
}

/// Config file location from the environment.
///
/// `UC_CONFIG_HOME` is set when running bundled on the hub, `DATA_DIR`
/// otherwise, with `./data` as the fallback.
#[must_use]
pub fn path_from_env() -> PathBuf {
    let dir = std::env::var("UC_CONFIG_HOME")
        .or_else(|_| std::env::var("DATA_DIR"))
        .unwrap_or_else(|_| "./data".to_string());
    PathBuf::from(dir).join(CONFIG_FILE)
}

/// Whether the driver runs bundled on the hub (`UC_CONFIG_HOME` set)
#[must_use]
pub fn is_bundled() -> bool {
    std::env::var_os("UC_CONFIG_HOME").is_some()
}

/// Shared handle to the runtime configuration
pub struct ConfigStore {
    path: PathBuf,
    config: RwLock<RuntimeConfig>,
    /// Serializes file writes
    write_lock: Mutex<()>,
    reconfiguring: AtomicBool,
    standby: AtomicBool,
}

impl ConfigStore {
    /// Store with default values that persists to `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, RuntimeConfig::default())
    }

    #[must_use]
    pub fn with_config(path: impl Into<PathBuf>, config: RuntimeConfig) -> Self {
        Self {
            path: path.into(),
            config: RwLock::new(config),
            write_lock: Mutex::new(()),
            reconfiguring: AtomicBool::new(false),
            standby: AtomicBool::new(false),
        }
    }

    /// Load the config file at `path`. A missing file yields defaults.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = match persistence::load_document(&path).await? {
            Some(doc) => {
                let config: RuntimeConfig = serde_json::from_value(Value::Object(doc))?;
                if !config.setup_complete {
                    tracing::warn!(
                        "The setup was not completed the last time. Please restart the setup process"
                    );
                }
                config
            }
            None => RuntimeConfig::default(),
        };
        Ok(Self::with_config(path, config))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current configuration
    #[must_use]
    pub fn snapshot(&self) -> RuntimeConfig {
        self.config
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<ProjectorEndpoint> {
        self.snapshot().endpoint()
    }

    #[must_use]
    pub fn is_setup_complete(&self) -> bool {
        self.snapshot().setup_complete
    }

    /// Set one key and persist it.
    ///
    /// The value is validated against [`RuntimeConfig`]. Writes to
    /// `setup_complete` are ignored while reconfiguring and are kept in
    /// memory only when no config file exists yet.
    pub async fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let value = value.into();
        let _guard = self.write_lock.lock().await;

        if key == "setup_complete" && self.is_reconfiguring() {
            tracing::debug!("Ignore setting setup_complete during reconfiguration");
            return Ok(());
        }

        let updated = self.validated(key, &value)?;

        if key == "setup_complete" && !persistence::exists(&self.path).await {
            tracing::debug!("Skip storing setup_complete as no config file exists yet");
        } else {
            // Memory only changes once the file write succeeded
            persistence::store_key(&self.path, key, &value).await?;
        }

        *self
            .config
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = updated;
        tracing::debug!("Stored {}: {} into runtime storage", key, value);
        Ok(())
    }

    /// Bundled deployments run on battery: the device status poller is
    /// disabled in memory without touching the config file.
    pub fn apply_bundled_mode(&self) {
        tracing::info!("Running bundled, device status poller disabled");
        self.config
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .mp_poller_interval = 0;
    }

    fn validated(&self, key: &str, value: &Value) -> Result<RuntimeConfig, ConfigError> {
        let mut doc = serde_json::to_value(self.snapshot())?;
        let Some(fields) = doc.as_object_mut() else {
            return Err(ConfigError::UnknownKey(key.to_string()));
        };
        if !fields.contains_key(key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        fields.insert(key.to_string(), value.clone());

        let updated: RuntimeConfig =
            serde_json::from_value(doc).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if updated.pjtalk_community.len() != 4 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: "community must be exactly 4 characters".to_string(),
            });
        }
        Ok(updated)
    }

    #[must_use]
    pub fn is_reconfiguring(&self) -> bool {
        self.reconfiguring.load(Ordering::SeqCst)
    }

    pub fn set_reconfiguring(&self, reconfiguring: bool) {
        self.reconfiguring.store(reconfiguring, Ordering::SeqCst);
    }

    /// Whether the hub reported entering standby
    #[must_use]
    pub fn is_standby(&self) -> bool {
        self.standby.load(Ordering::SeqCst)
    }

    pub fn set_standby(&self, standby: bool) {
        self.standby.store(standby, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_path;
    use serde_json::json;

    #[tokio::test]
    async fn test_defaults_without_file() {
        let store = ConfigStore::load(temp_path("defaults")).await.unwrap();
        let config = store.snapshot();
        assert!(!config.setup_complete);
        assert_eq!(config.sdcp_port, 53484);
        assert_eq!(config.sdap_port, 53862);
        assert_eq!(config.pjtalk_community, "SONY");
        assert_eq!(config.mp_poller_interval, 20);
        assert_eq!(config.lt_poller_interval, 1800);
        assert!(store.endpoint().is_none());
    }

    #[tokio::test]
    async fn test_set_persists_single_key() {
        let path = temp_path("persist");
        let store = ConfigStore::new(&path);
        store.set("ip", "192.168.1.50").await.unwrap();
        store.set("sdcp_port", 50000).await.unwrap();
        store.set("setup_complete", true).await.unwrap();

        let reloaded = ConfigStore::load(&path).await.unwrap().snapshot();
        assert_eq!(reloaded.ip, "192.168.1.50");
        assert_eq!(reloaded.sdcp_port, 50000);
        assert!(reloaded.setup_complete);

        let endpoint = reloaded.endpoint().unwrap();
        assert_eq!(endpoint.tcp_port, 50000);
    }

    #[tokio::test]
    async fn test_setup_complete_not_first_key() {
        let path = temp_path("first-key");
        let store = ConfigStore::new(&path);
        store.set("setup_complete", true).await.unwrap();

        assert!(store.is_setup_complete());
        assert!(!persistence::exists(&path).await);
    }

    #[tokio::test]
    async fn test_setup_complete_ignored_while_reconfiguring() {
        let path = temp_path("reconfigure");
        let store = ConfigStore::new(&path);
        store.set("ip", "10.0.0.1").await.unwrap();
        store.set_reconfiguring(true);
        store.set("setup_complete", true).await.unwrap();
        assert!(!store.is_setup_complete());

        store.set_reconfiguring(false);
        store.set("setup_complete", true).await.unwrap();
        assert!(store.is_setup_complete());
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let store = ConfigStore::new(temp_path("invalid"));
        assert!(matches!(
            store.set("sdcp_port", -1).await,
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.set("pjtalk_community", "TOOLONG").await,
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.set("colour", json!("blue")).await,
            Err(ConfigError::UnknownKey(_))
        ));
        assert_eq!(store.snapshot(), RuntimeConfig::default());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_memory() {
        let path = temp_path("failed-write");
        let store = ConfigStore::new(&path);
        store.set("ip", "10.0.0.1").await.unwrap();

        // Replace the config directory with a plain file so writes fail
        let dir = path.parent().unwrap();
        std::fs::remove_dir_all(dir).unwrap();
        std::fs::write(dir, "not a directory").unwrap();

        assert!(store.set("ip", "10.9.9.9").await.is_err());
        assert_eq!(store.snapshot().ip, "10.0.0.1");
        std::fs::remove_file(dir).unwrap();
    }

    #[tokio::test]
    async fn test_bundled_mode_disables_device_polling_in_memory() {
        let path = temp_path("bundled");
        let store = ConfigStore::new(&path);
        store.set("mp_poller_interval", 30).await.unwrap();

        store.apply_bundled_mode();
        assert_eq!(store.snapshot().mp_poller_interval, 0);
        assert_eq!(store.snapshot().lt_poller_interval, 1800);

        let reloaded = ConfigStore::load(&path).await.unwrap().snapshot();
        assert_eq!(reloaded.mp_poller_interval, 30);
    }

    #[test]
    fn test_transient_flags() {
        let store = ConfigStore::new(temp_path("flags"));
        assert!(!store.is_standby());
        store.set_standby(true);
        assert!(store.is_standby());
        store.set_reconfiguring(true);
        assert!(store.is_reconfiguring());
    }

    #[test]
    fn test_derived_ids() {
        let config = RuntimeConfig {
            id: "VPL-VW270-42".to_string(),
            ..RuntimeConfig::default()
        };
        assert_eq!(config.remote_id(), "remote-VPL-VW270-42");
        assert_eq!(config.lamp_timer_id(), "lamptimer-VPL-VW270-42");
    }
}
