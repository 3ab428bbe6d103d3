//! Sony projector driver

use projector_core::{config, ConfigStore, Driver, InMemoryRegistry, RegistryEvent, SetupInput};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter from `RUST_LOG`, else the `UC_LOG_LEVEL` level for the driver crates
fn log_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("UC_LOG_LEVEL")
            .map(|level| level.to_lowercase())
            .unwrap_or_else(|_| "debug".to_string());
        format!("projector_driver={level},projector_core={level},sdcp_protocol={level},info")
            .into()
    })
}

/// Log every registry change, standing in for the hub connection
fn spawn_event_logger(registry: &InMemoryRegistry) {
    let mut events = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RegistryEvent::EntityRegistered { entity_id }) => {
                    tracing::info!("Entity {} available", entity_id);
                }
                Ok(RegistryEvent::AttributesUpdated {
                    entity_id,
                    attributes,
                }) => {
                    tracing::info!(
                        "{} attributes: {}",
                        entity_id,
                        serde_json::Value::Object(attributes)
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event logger lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(log_filter())
        .init();

    tracing::info!(
        "Starting Sony projector driver {}",
        env!("CARGO_PKG_VERSION")
    );

    let config_path = config::path_from_env();
    tracing::info!("Using config file {}", config_path.display());
    let config = Arc::new(ConfigStore::load(config_path).await?);
    if config::is_bundled() {
        config.apply_bundled_mode();
    }

    let registry = Arc::new(InMemoryRegistry::new());
    spawn_event_logger(&registry);

    let driver = Driver::new(config.clone(), registry);
    driver.startup().await;

    if !config.is_setup_complete() {
        // Blank address means auto-discovery
        let ip = std::env::var("SDCP_IP").unwrap_or_default();
        if ip.is_empty() {
            tracing::info!(
                "Running setup with discovery on UDP port {}",
                config.snapshot().sdap_port
            );
        } else {
            tracing::info!("Running setup for projector at {}", ip);
        }

        driver.setup().start(false);
        if let Err(e) = driver
            .setup()
            .submit(SetupInput { ip, advanced: None })
            .await
        {
            tracing::error!("Setup failed: {}", e);
            driver.setup().abort();
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    driver.shutdown().await;

    Ok(())
}
