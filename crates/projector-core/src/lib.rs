//! Sony projector integration core
//!
//! This crate provides the hub-facing side of the projector driver on top
//! of the low-level SDCP protocol: entities, command dispatch, attribute
//! polling, setup and persisted configuration.

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod entity;
pub mod error;
pub mod persistence;
pub mod poller;
pub mod registry;
pub mod setup;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigStore, RuntimeConfig};
pub use dispatcher::Dispatcher;
pub use driver::Driver;
pub use entity::{EntityDefinition, EntityKind, PowerState};
pub use error::{ConfigError, DispatchError, SetupError};
pub use poller::{PollOutcome, PollerController, Pollers, Reconciler};
pub use registry::{
    Attributes, EntityRegistry, EntityState, InMemoryRegistry, RegistryEvent, StatusCode,
};
pub use setup::{AdvancedSettings, SetupFlow, SetupForm, SetupInput, SetupState};
