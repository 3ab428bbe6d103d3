//! Common types used throughout the protocol

use std::fmt;
use thiserror::Error;

/// Default TCP port for SDCP command/response traffic
pub const DEFAULT_SDCP_PORT: u16 = 53484;

/// Default UDP port for SDAP advertisement beacons
pub const DEFAULT_SDAP_PORT: u16 = 53862;

/// Default PJ Talk community
pub const DEFAULT_COMMUNITY: &str = "SONY";

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Request timeout")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Partial send: {sent} of {expected} bytes")]
    PartialSend { sent: usize, expected: usize },

    #[error("Command {command:#06X} rejected: {reason} ({code:#06X})")]
    Rejected {
        command: u16,
        code: u16,
        reason: String,
    },
}

impl ProtocolError {
    /// Build a rejection error from a device failure code
    #[must_use]
    pub fn rejected(command: u16, code: u16) -> Self {
        let reason = match ErrorCode::try_from(code) {
            Ok(known) => known.to_string(),
            Err(unknown) => format!("Unknown error code {unknown:#06X}"),
        };
        ProtocolError::Rejected {
            command,
            code,
            reason,
        }
    }

    /// Whether the error was a device-side rejection rather than a transport failure
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, ProtocolError::Rejected { .. })
    }
}

/// Failure codes a projector returns in the data field of an error response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    InvalidItem = 0x0101,
    InvalidItemRequest = 0x0102,
    InvalidLength = 0x0103,
    InvalidData = 0x0104,
    ShortData = 0x0111,
    NotApplicableItem = 0x0180,
    DifferentCommunity = 0x0201,
    InvalidVersion = 0x1001,
    InvalidCategory = 0x1002,
    InvalidRequest = 0x1003,
    ShortHeader = 0x1011,
    ShortCommunity = 0x1012,
    ShortCommand = 0x1013,
    TimeoutNetwork = 0x2001,
    TimeoutComm = 0xF001,
    CheckSumErrorComm = 0xF010,
    FramingErrorComm = 0xF020,
    ParityErrorComm = 0xF030,
    OverRunErrorComm = 0xF040,
    OtherCommError = 0xF050,
    UnknownResponse = 0xF0F0,
    ReadErrorNvram = 0xF110,
    WriteErrorNvram = 0xF120,
}

impl TryFrom<u16> for ErrorCode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, u16> {
        match value {
            0x0101 => Ok(ErrorCode::InvalidItem),
            0x0102 => Ok(ErrorCode::InvalidItemRequest),
            0x0103 => Ok(ErrorCode::InvalidLength),
            0x0104 => Ok(ErrorCode::InvalidData),
            0x0111 => Ok(ErrorCode::ShortData),
            0x0180 => Ok(ErrorCode::NotApplicableItem),
            0x0201 => Ok(ErrorCode::DifferentCommunity),
            0x1001 => Ok(ErrorCode::InvalidVersion),
            0x1002 => Ok(ErrorCode::InvalidCategory),
            0x1003 => Ok(ErrorCode::InvalidRequest),
            0x1011 => Ok(ErrorCode::ShortHeader),
            0x1012 => Ok(ErrorCode::ShortCommunity),
            0x1013 => Ok(ErrorCode::ShortCommand),
            0x2001 => Ok(ErrorCode::TimeoutNetwork),
            0xF001 => Ok(ErrorCode::TimeoutComm),
            0xF010 => Ok(ErrorCode::CheckSumErrorComm),
            0xF020 => Ok(ErrorCode::FramingErrorComm),
            0xF030 => Ok(ErrorCode::ParityErrorComm),
            0xF040 => Ok(ErrorCode::OverRunErrorComm),
            0xF050 => Ok(ErrorCode::OtherCommError),
            0xF0F0 => Ok(ErrorCode::UnknownResponse),
            0xF110 => Ok(ErrorCode::ReadErrorNvram),
            0xF120 => Ok(ErrorCode::WriteErrorNvram),
            _ => Err(value),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::InvalidItem => "Invalid Item",
            ErrorCode::InvalidItemRequest => "Invalid Item Request",
            ErrorCode::InvalidLength => "Invalid Length",
            ErrorCode::InvalidData => "Invalid Data",
            ErrorCode::ShortData => "Short Data",
            ErrorCode::NotApplicableItem => "Not Applicable Item",
            ErrorCode::DifferentCommunity => "Different Community",
            ErrorCode::InvalidVersion => "Invalid Version",
            ErrorCode::InvalidCategory => "Invalid Category",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::ShortHeader => "Short Header",
            ErrorCode::ShortCommunity => "Short Community",
            ErrorCode::ShortCommand => "Short Command",
            ErrorCode::TimeoutNetwork => "Timeout Network",
            ErrorCode::TimeoutComm => "Timeout Comm",
            ErrorCode::CheckSumErrorComm => "Check Sum Error Comm",
            ErrorCode::FramingErrorComm => "Framing Error Comm",
            ErrorCode::ParityErrorComm => "Parity Error Comm",
            ErrorCode::OverRunErrorComm => "Over Run Error Comm",
            ErrorCode::OtherCommError => "Other Comm Error",
            ErrorCode::UnknownResponse => "Unknown Response",
            ErrorCode::ReadErrorNvram => "Read Error NVRAM",
            ErrorCode::WriteErrorNvram => "Write Error NVRAM",
        };
        f.write_str(name)
    }
}

/// Identifies and parameterizes one physical projector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectorEndpoint {
    pub ip: String,
    pub tcp_port: u16,
    pub udp_port: u16,
    pub community: String,
}

impl ProjectorEndpoint {
    /// Endpoint with default ports and community
    #[must_use]
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            tcp_port: DEFAULT_SDCP_PORT,
            udp_port: DEFAULT_SDAP_PORT,
            community: DEFAULT_COMMUNITY.to_string(),
        }
    }

    #[must_use]
    pub fn with_tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    #[must_use]
    pub fn with_udp_port(mut self, port: u16) -> Self {
        self.udp_port = port;
        self
    }

    #[must_use]
    pub fn with_community(mut self, community: impl Into<String>) -> Self {
        self.community = community.into();
        self
    }

    /// `ip:port` address of the SDCP command socket
    #[must_use]
    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.ip, self.tcp_port)
    }
}

/// Identity broadcast by a projector in its SDAP beacon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementInfo {
    /// Two character product code
    pub short_id: String,
    pub model_name: String,
    pub serial_number: u32,
    pub power_state: u16,
    pub location: String,
    /// Address the beacon was received from
    pub source_ip: String,
}

impl AdvertisementInfo {
    /// Stable entity identity `<model>-<serial>`
    #[must_use]
    pub fn entity_id(&self) -> String {
        format!("{}-{}", self.model_name, self.serial_number)
    }

    /// Display name `Sony <model>`
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("Sony {}", self.model_name)
    }
}
