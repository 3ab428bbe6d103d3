//! Logical command catalog
//!
//! Maps every hub-facing command name to the SDCP item and value it sends.
//! Lookups are case-insensitive and never fail loudly: an unknown name is
//! simply `None`, which the dispatcher reports as not implemented.

use sdcp_protocol::commands::{
    AspectRatio, CalibrationPreset, Hdr, InputLagReduction, LampControl, MenuPosition,
    Motionflow, ThreeDFormat, TwoDThreeDSelect,
};
use sdcp_protocol::{Input, IrCode, Item};

/// On/off/toggle selector for binary features
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
    Toggle,
}

/// What a logical command does on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Power on/off, toggle reads the power status first
    Power(Switch),
    /// Picture muting, toggle reads the muting state first
    Mute(Switch),
    /// Input chosen by the `source` parameter
    SelectSource,
    /// Fixed input
    Input(Input),
    /// Single SET of a setting item
    Setting { item: Item, value: u16 },
    /// Reads HDR then sets the opposite
    HdrToggle,
    /// Simulated IR key, never acknowledged
    Ir(IrCode),
}

/// One catalog row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub kind: CommandKind,
    /// Whether the projector answers the final request of this command
    pub expects_response: bool,
    /// Exported to the hub as a simple command
    pub simple: bool,
}

const fn hub(name: &'static str, kind: CommandKind) -> CatalogEntry {
    CatalogEntry {
        name,
        kind,
        expects_response: !matches!(kind, CommandKind::Ir(_)),
        simple: false,
    }
}

const fn simple(name: &'static str, kind: CommandKind) -> CatalogEntry {
    CatalogEntry {
        name,
        kind,
        expects_response: !matches!(kind, CommandKind::Ir(_)),
        simple: true,
    }
}

const fn setting(item: Item, value: u16) -> CommandKind {
    CommandKind::Setting { item, value }
}

static CATALOG: &[CatalogEntry] = &[
    // Media player standard commands
    hub("on", CommandKind::Power(Switch::On)),
    hub("off", CommandKind::Power(Switch::Off)),
    hub("toggle", CommandKind::Power(Switch::Toggle)),
    hub("mute", CommandKind::Mute(Switch::On)),
    hub("unmute", CommandKind::Mute(Switch::Off)),
    hub("mute_toggle", CommandKind::Mute(Switch::Toggle)),
    hub("select_source", CommandKind::SelectSource),
    hub("home", CommandKind::Ir(IrCode::Menu)),
    // No back key on the projector remote
    hub("back", CommandKind::Ir(IrCode::CursorLeft)),
    hub("cursor_up", CommandKind::Ir(IrCode::CursorUp)),
    hub("cursor_down", CommandKind::Ir(IrCode::CursorDown)),
    hub("cursor_left", CommandKind::Ir(IrCode::CursorLeft)),
    hub("cursor_right", CommandKind::Ir(IrCode::CursorRight)),
    hub("cursor_enter", CommandKind::Ir(IrCode::Enter)),
    // Inputs
    simple("INPUT_HDMI_1", CommandKind::Input(Input::Hdmi1)),
    simple("INPUT_HDMI_2", CommandKind::Input(Input::Hdmi2)),
    simple("PICTURE_MUTING_TOGGLE", CommandKind::Mute(Switch::Toggle)),
    // Calibrated presets
    simple("MODE_PRESET_CINEMA_FILM_1", setting(Item::CalibrationPreset, CalibrationPreset::CinemaFilm1 as u16)),
    simple("MODE_PRESET_CINEMA_FILM_2", setting(Item::CalibrationPreset, CalibrationPreset::CinemaFilm2 as u16)),
    simple("MODE_PRESET_REF", setting(Item::CalibrationPreset, CalibrationPreset::Reference as u16)),
    simple("MODE_PRESET_TV", setting(Item::CalibrationPreset, CalibrationPreset::Tv as u16)),
    simple("MODE_PRESET_PHOTO", setting(Item::CalibrationPreset, CalibrationPreset::Photo as u16)),
    simple("MODE_PRESET_GAME", setting(Item::CalibrationPreset, CalibrationPreset::Game as u16)),
    simple("MODE_PRESET_BRIGHT_CINEMA", setting(Item::CalibrationPreset, CalibrationPreset::BrightCinema as u16)),
    simple("MODE_PRESET_BRIGHT_TV", setting(Item::CalibrationPreset, CalibrationPreset::BrightTv as u16)),
    simple("MODE_PRESET_USER", setting(Item::CalibrationPreset, CalibrationPreset::User as u16)),
    // Aspect ratio
    simple("MODE_ASPECT_RATIO_NORMAL", setting(Item::AspectRatio, AspectRatio::Normal as u16)),
    simple("MODE_ASPECT_RATIO_V_STRETCH", setting(Item::AspectRatio, AspectRatio::VStretch as u16)),
    simple("MODE_ASPECT_RATIO_ZOOM_1_85", setting(Item::AspectRatio, AspectRatio::Zoom1_85 as u16)),
    simple("MODE_ASPECT_RATIO_ZOOM_2_35", setting(Item::AspectRatio, AspectRatio::Zoom2_35 as u16)),
    simple("MODE_ASPECT_RATIO_STRETCH", setting(Item::AspectRatio, AspectRatio::Stretch as u16)),
    simple("MODE_ASPECT_RATIO_SQUEEZE", setting(Item::AspectRatio, AspectRatio::Squeeze as u16)),
    // Motionflow
    simple("MODE_MOTIONFLOW_OFF", setting(Item::Motionflow, Motionflow::Off as u16)),
    simple("MODE_MOTIONFLOW_SMOTH_HIGH", setting(Item::Motionflow, Motionflow::SmoothHigh as u16)),
    simple("MODE_MOTIONFLOW_SMOTH_LOW", setting(Item::Motionflow, Motionflow::SmoothLow as u16)),
    simple("MODE_MOTIONFLOW_IMPULSE", setting(Item::Motionflow, Motionflow::Impulse as u16)),
    simple("MODE_MOTIONFLOW_COMBINATION", setting(Item::Motionflow, Motionflow::Combination as u16)),
    simple("MODE_MOTIONFLOW_TRUE_CINEMA", setting(Item::Motionflow, Motionflow::TrueCinema as u16)),
    // HDR
    simple("MODE_HDR_ON", setting(Item::Hdr, Hdr::On as u16)),
    simple("MODE_HDR_OFF", setting(Item::Hdr, Hdr::Off as u16)),
    simple("MODE_HDR_AUTO", setting(Item::Hdr, Hdr::Auto as u16)),
    simple("MODE_HDR_TOGGLE", CommandKind::HdrToggle),
    // 2D/3D
    simple("MODE_2D_3D_SELECT_AUTO", setting(Item::TwoDThreeDSelect, TwoDThreeDSelect::Auto as u16)),
    simple("MODE_2D_3D_SELECT_3D", setting(Item::TwoDThreeDSelect, TwoDThreeDSelect::ThreeD as u16)),
    simple("MODE_2D_3D_SELECT_2D", setting(Item::TwoDThreeDSelect, TwoDThreeDSelect::TwoD as u16)),
    simple("MODE_3D_FORMAT_SIMULATED_3D", setting(Item::ThreeDFormat, ThreeDFormat::Simulated3d as u16)),
    simple("MODE_3D_FORMAT_SIDE_BY_SIDE", setting(Item::ThreeDFormat, ThreeDFormat::SideBySide as u16)),
    simple("MODE_3D_FORMAT_OVER_UNDER", setting(Item::ThreeDFormat, ThreeDFormat::OverUnder as u16)),
    // Lamp, latency, menu
    simple("LAMP_CONTROL_LOW", setting(Item::LampControl, LampControl::Low as u16)),
    simple("LAMP_CONTROL_HIGH", setting(Item::LampControl, LampControl::High as u16)),
    simple("INPUT_LAG_REDUCTION_ON", setting(Item::InputLagReduction, InputLagReduction::On as u16)),
    simple("INPUT_LAG_REDUCTION_OFF", setting(Item::InputLagReduction, InputLagReduction::Off as u16)),
    simple("MENU_POSITION_BOTTOM_LEFT", setting(Item::MenuPosition, MenuPosition::BottomLeft as u16)),
    simple("MENU_POSITION_CENTER", setting(Item::MenuPosition, MenuPosition::Center as u16)),
    // IR keys
    simple("MENU", CommandKind::Ir(IrCode::Menu)),
    simple("LENS_SHIFT_UP", CommandKind::Ir(IrCode::LensShiftUp)),
    simple("LENS_SHIFT_DOWN", CommandKind::Ir(IrCode::LensShiftDown)),
    simple("LENS_SHIFT_LEFT", CommandKind::Ir(IrCode::LensShiftLeft)),
    simple("LENS_SHIFT_RIGHT", CommandKind::Ir(IrCode::LensShiftRight)),
    simple("LENS_FOCUS_FAR", CommandKind::Ir(IrCode::LensFocusFar)),
    simple("LENS_FOCUS_NEAR", CommandKind::Ir(IrCode::LensFocusNear)),
    simple("LENS_ZOOM_LARGE", CommandKind::Ir(IrCode::LensZoomLarge)),
    simple("LENS_ZOOM_SMALL", CommandKind::Ir(IrCode::LensZoomSmall)),
];

/// Resolve a logical command name, ignoring case
#[must_use]
pub fn lookup(name: &str) -> Option<&'static CatalogEntry> {
    CATALOG
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(name))
}

/// All catalog rows
#[must_use]
pub fn entries() -> &'static [CatalogEntry] {
    CATALOG
}

/// Names exported to the hub as simple commands
#[must_use]
pub fn simple_commands() -> Vec<&'static str> {
    CATALOG
        .iter()
        .filter(|entry| entry.simple)
        .map(|entry| entry.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let upper = lookup("MODE_HDR_TOGGLE").unwrap();
        let lower = lookup("mode_hdr_toggle").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.kind, CommandKind::HdrToggle);
        assert_eq!(lookup("CURSOR_UP").unwrap().kind, CommandKind::Ir(IrCode::CursorUp));
    }

    #[test]
    fn test_unknown_command() {
        assert!(lookup("MODE_WARP_DRIVE").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_ir_entries_expect_no_response() {
        for entry in entries() {
            let is_ir = matches!(entry.kind, CommandKind::Ir(_));
            assert_eq!(entry.expects_response, !is_ir, "{}", entry.name);
        }
    }

    #[test]
    fn test_names_are_unique() {
        let mut seen = HashSet::new();
        for entry in entries() {
            assert!(seen.insert(entry.name.to_ascii_lowercase()), "{}", entry.name);
        }
    }

    #[test]
    fn test_setting_values() {
        assert_eq!(
            lookup("MODE_ASPECT_RATIO_ZOOM_2_35").unwrap().kind,
            CommandKind::Setting {
                item: Item::AspectRatio,
                value: 0x000D
            }
        );
        assert_eq!(
            lookup("MODE_PRESET_USER").unwrap().kind,
            CommandKind::Setting {
                item: Item::CalibrationPreset,
                value: 0x0008
            }
        );
        assert_eq!(
            lookup("home").unwrap().kind,
            CommandKind::Ir(IrCode::Menu)
        );
        assert_eq!(
            lookup("back").unwrap().kind,
            CommandKind::Ir(IrCode::CursorLeft)
        );
    }

    #[test]
    fn test_simple_command_list() {
        let names = simple_commands();
        assert!(names.contains(&"INPUT_HDMI_1"));
        assert!(names.contains(&"LENS_ZOOM_SMALL"));
        assert!(!names.contains(&"on"));
    }
}
