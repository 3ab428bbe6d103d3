//! SDCP command items and value tables
//!
//! Item numbers and data values follow the Sony SDCP / PJ Talk protocol
//! manual for the VPL-VW series.

/// Request action carried in byte 6 of a request frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    /// Write a setting
    Set = 0x00,
    /// Read a setting
    Get = 0x01,
}

impl Action {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Action::Set),
            0x01 => Some(Action::Get),
            _ => None,
        }
    }
}

/// Setting / status items answered with a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Item {
    /// Input select
    Input = 0x0001,
    /// Calibrated preset (picture mode)
    CalibrationPreset = 0x0002,
    /// Lamp control (high/low)
    LampControl = 0x001A,
    /// Aspect ratio
    AspectRatio = 0x0020,
    /// Picture muting
    PictureMuting = 0x0030,
    /// Motionflow
    Motionflow = 0x0059,
    /// 2D/3D display select
    TwoDThreeDSelect = 0x0060,
    /// 3D format
    ThreeDFormat = 0x0061,
    /// Picture position
    PicturePosition = 0x0066,
    /// HDR
    Hdr = 0x007C,
    /// Input lag reduction
    InputLagReduction = 0x0099,
    /// Menu position
    MenuPosition = 0x00A6,
    /// Error status (read only)
    StatusError = 0x0101,
    /// Power status (read only)
    StatusPower = 0x0102,
    /// Lamp timer in hours (read only)
    StatusLampTimer = 0x0113,
    /// Power on/off
    SetPower = 0x0130,
}

impl Item {
    /// Wire value of the item
    #[must_use]
    pub fn id(self) -> u16 {
        self as u16
    }
}

/// Simulated IR remote keys.
///
/// The projector never answers these, so they must be sent without waiting
/// for a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum IrCode {
    Menu = 0x1729,
    CursorRight = 0x1733,
    CursorLeft = 0x1734,
    CursorUp = 0x1735,
    CursorDown = 0x1736,
    Enter = 0x175A,
    LensShiftUp = 0x1772,
    LensShiftDown = 0x1773,
    LensFocusFar = 0x1774,
    LensFocusNear = 0x1775,
    LensZoomLarge = 0x1777,
    LensZoomSmall = 0x1778,
    LensShiftLeft = 0x1902,
    LensShiftRight = 0x1903,
}

impl IrCode {
    /// Wire value of the IR key
    #[must_use]
    pub fn id(self) -> u16 {
        self as u16
    }
}

/// Power status values returned by [`Item::StatusPower`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PowerStatus {
    Standby = 0x0000,
    StartUp = 0x0001,
    StartUpLamp = 0x0002,
    PowerOn = 0x0003,
    Cooling = 0x0004,
    Cooling2 = 0x0005,
}

impl PowerStatus {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(PowerStatus::Standby),
            0x0001 => Some(PowerStatus::StartUp),
            0x0002 => Some(PowerStatus::StartUpLamp),
            0x0003 => Some(PowerStatus::PowerOn),
            0x0004 => Some(PowerStatus::Cooling),
            0x0005 => Some(PowerStatus::Cooling2),
            _ => None,
        }
    }

    /// Whether the projector should be presented as powered on.
    ///
    /// Standby and both cooling phases count as off; start-up phases and
    /// any unknown code count as on.
    #[must_use]
    pub fn is_on(code: u16) -> bool {
        !matches!(
            Self::from_u16(code),
            Some(PowerStatus::Standby | PowerStatus::Cooling | PowerStatus::Cooling2)
        )
    }
}

/// Data values for [`Item::SetPower`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PowerCommand {
    Off = 0x0000,
    On = 0x0001,
}

/// HDMI inputs for [`Item::Input`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Input {
    Hdmi1 = 0x0002,
    Hdmi2 = 0x0003,
}

impl Input {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0002 => Some(Input::Hdmi1),
            0x0003 => Some(Input::Hdmi2),
            _ => None,
        }
    }

    /// Input by HDMI port number (1 or 2)
    #[must_use]
    pub fn from_port(port: u8) -> Option<Self> {
        match port {
            1 => Some(Input::Hdmi1),
            2 => Some(Input::Hdmi2),
            _ => None,
        }
    }

    /// Source name shown to the user
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Input::Hdmi1 => "HDMI 1",
            Input::Hdmi2 => "HDMI 2",
        }
    }

    /// Parse a source name shown to the user
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "HDMI 1" => Some(Input::Hdmi1),
            "HDMI 2" => Some(Input::Hdmi2),
            _ => None,
        }
    }
}

/// Data values for [`Item::PictureMuting`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PictureMuting {
    Off = 0x0000,
    On = 0x0001,
}

/// Data values for [`Item::Hdr`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Hdr {
    Off = 0x0000,
    On = 0x0001,
    Auto = 0x0002,
}

impl Hdr {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Hdr::Off),
            0x0001 => Some(Hdr::On),
            0x0002 => Some(Hdr::Auto),
            _ => None,
        }
    }

    /// Value a toggle switches to: on and auto both go off, off goes on
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Hdr::On | Hdr::Auto => Hdr::Off,
            Hdr::Off => Hdr::On,
        }
    }
}

/// Data values for [`Item::AspectRatio`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AspectRatio {
    Normal = 0x0001,
    VStretch = 0x000B,
    Zoom1_85 = 0x000C,
    Zoom2_35 = 0x000D,
    Stretch = 0x000E,
    Squeeze = 0x000F,
}

/// Data values for [`Item::CalibrationPreset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CalibrationPreset {
    CinemaFilm1 = 0x0000,
    CinemaFilm2 = 0x0001,
    Reference = 0x0002,
    Tv = 0x0003,
    Photo = 0x0004,
    Game = 0x0005,
    BrightCinema = 0x0006,
    BrightTv = 0x0007,
    User = 0x0008,
}

/// Data values for [`Item::Motionflow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Motionflow {
    Off = 0x0000,
    SmoothHigh = 0x0001,
    SmoothLow = 0x0002,
    Impulse = 0x0003,
    Combination = 0x0004,
    TrueCinema = 0x0005,
}

/// Data values for [`Item::TwoDThreeDSelect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TwoDThreeDSelect {
    Auto = 0x0000,
    ThreeD = 0x0001,
    TwoD = 0x0002,
}

/// Data values for [`Item::ThreeDFormat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ThreeDFormat {
    Simulated3d = 0x0000,
    SideBySide = 0x0001,
    OverUnder = 0x0002,
}

/// Data values for [`Item::LampControl`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum LampControl {
    Low = 0x0000,
    High = 0x0001,
}

/// Data values for [`Item::InputLagReduction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum InputLagReduction {
    Off = 0x0000,
    On = 0x0001,
}

/// Data values for [`Item::MenuPosition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MenuPosition {
    BottomLeft = 0x0000,
    Center = 0x0001,
}
