//! Entity definitions registered with the hub

use crate::catalog;
use crate::registry::Attributes;
use serde::Serialize;
use serde_json::{json, Value};

/// Attribute keys
pub mod attr {
    pub const STATE: &str = "state";
    pub const MUTED: &str = "muted";
    pub const SOURCE: &str = "source";
    pub const SOURCE_LIST: &str = "source_list";
    pub const VALUE: &str = "value";
    pub const UNIT: &str = "unit";
}

/// Unit appended to lamp timer values
pub const LAMP_HOURS_UNIT: &str = "h";

/// Entity type as understood by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    MediaPlayer,
    Remote,
    Sensor,
}

/// Power state attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

impl PowerState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::On => "ON",
            PowerState::Off => "OFF",
            PowerState::Unknown => "UNKNOWN",
        }
    }

    #[must_use]
    pub fn from_bool(on: bool) -> Self {
        if on {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

impl From<PowerState> for Value {
    fn from(state: PowerState) -> Self {
        Value::String(state.as_str().to_string())
    }
}

/// Entity definition handed to the registry
#[derive(Debug, Clone, Serialize)]
pub struct EntityDefinition {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub features: Vec<String>,
    pub attributes: Attributes,
    pub simple_commands: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn simple_commands() -> Vec<String> {
    catalog::simple_commands()
        .into_iter()
        .map(String::from)
        .collect()
}

fn attributes(pairs: Vec<(&str, Value)>) -> Attributes {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Id of the remote entity paired with a media player
#[must_use]
pub fn remote_id(mp_id: &str) -> String {
    format!("remote-{mp_id}")
}

/// Id of the lamp timer sensor paired with a media player
#[must_use]
pub fn lamp_timer_id(mp_id: &str) -> String {
    format!("lamptimer-{mp_id}")
}

/// Format a lamp timer reading for display
#[must_use]
pub fn lamp_hours_display(hours: u16) -> String {
    format!("{hours} {LAMP_HOURS_UNIT}")
}

#[must_use]
pub fn media_player(id: &str, name: &str) -> EntityDefinition {
    EntityDefinition {
        id: id.to_string(),
        name: name.to_string(),
        kind: EntityKind::MediaPlayer,
        features: strings(&[
            "on_off",
            "toggle",
            "mute",
            "unmute",
            "mute_toggle",
            "dpad",
            "home",
            "select_source",
        ]),
        attributes: attributes(vec![
            (attr::STATE, PowerState::Unknown.into()),
            (attr::MUTED, json!(false)),
            (attr::SOURCE, json!("")),
            (attr::SOURCE_LIST, json!(["HDMI 1", "HDMI 2"])),
        ]),
        simple_commands: simple_commands(),
    }
}

#[must_use]
pub fn remote(mp_id: &str, name: &str) -> EntityDefinition {
    EntityDefinition {
        id: remote_id(mp_id),
        name: format!("{name} Remote"),
        kind: EntityKind::Remote,
        features: strings(&["on_off", "toggle"]),
        attributes: attributes(vec![(attr::STATE, PowerState::Unknown.into())]),
        simple_commands: simple_commands(),
    }
}

#[must_use]
pub fn lamp_timer(mp_id: &str, name: &str) -> EntityDefinition {
    EntityDefinition {
        id: lamp_timer_id(mp_id),
        name: format!("Lamp Timer {name}"),
        kind: EntityKind::Sensor,
        features: Vec::new(),
        attributes: attributes(vec![
            (attr::STATE, PowerState::On.into()),
            (attr::UNIT, json!(LAMP_HOURS_UNIT)),
        ]),
        simple_commands: Vec::new(),
    }
}

/// All entities exposed for one projector
#[must_use]
pub fn all(mp_id: &str, name: &str) -> Vec<EntityDefinition> {
    vec![
        media_player(mp_id, name),
        remote(mp_id, name),
        lamp_timer(mp_id, name),
    ]
}
