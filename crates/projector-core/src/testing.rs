//! Shared fixtures for unit tests

use crate::config::{ConfigStore, RuntimeConfig};
use crate::entity;
use crate::registry::{EntityRegistry, InMemoryRegistry};
use sdcp_protocol::mock::MockProjector;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const MP_ID: &str = "mp-1";

/// Unique config file path under the system temp dir
pub(crate) fn temp_path(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir()
        .join(format!("projector-core-{}-{}-{}", name, std::process::id(), nanos))
        .join("config.json")
}

/// Mock projector, registry with the three entities, and a completed config
pub(crate) struct Harness {
    pub mock: MockProjector,
    pub registry: Arc<InMemoryRegistry>,
    pub config: Arc<ConfigStore>,
}

pub(crate) async fn harness(name: &str) -> Harness {
    let mock = MockProjector::start("SONY").await.unwrap();
    let config = RuntimeConfig {
        ip: "127.0.0.1".to_string(),
        id: MP_ID.to_string(),
        name: "Sony VPL-TEST".to_string(),
        setup_complete: true,
        sdcp_port: mock.port(),
        ..RuntimeConfig::default()
    };
    let config = Arc::new(ConfigStore::with_config(temp_path(name), config));

    let registry = Arc::new(InMemoryRegistry::new());
    for definition in entity::all(MP_ID, "Sony VPL-TEST") {
        registry.register_entity(definition);
    }

    Harness {
        mock,
        registry,
        config,
    }
}

/// Poll `condition` until it holds or two seconds pass
pub(crate) async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
