//! SDCP frame structure and SDAP beacon decoding

use bytes::{BufMut, BytesMut};

use crate::commands::Action;
use crate::types::{AdvertisementInfo, ProtocolError, DEFAULT_COMMUNITY};

/// Protocol version carried in byte 0 of every SDCP frame
pub const PROTOCOL_VERSION: u8 = 2;

/// Request category used for known-IP control
pub const DEFAULT_CATEGORY: u8 = 10;

/// Frame size without data: version(1) + category(1) + community(4) +
/// action/status(1) + command(2) + `data_len(1)` = 10
pub const HEADER_SIZE: usize = 10;

/// Size of the optional data field
pub const DATA_SIZE: usize = 2;

/// Minimum SDAP beacon size up to and including the power state field
pub const MIN_ADVERTISEMENT_SIZE: usize = 26;

/// Header fields shared by requests, responses and beacons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub category: u8,
    pub community: String,
}

impl FrameHeader {
    /// Header for the given community with the default version and category
    #[must_use]
    pub fn new(community: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            category: DEFAULT_CATEGORY,
            community: community.into(),
        }
    }

    fn community_bytes(&self) -> Result<[u8; 4], ProtocolError> {
        let raw = self.community.as_bytes();
        <[u8; 4]>::try_from(raw).map_err(|_| {
            ProtocolError::Encoding(format!(
                "community must be exactly 4 bytes, got {:?}",
                self.community
            ))
        })
    }
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self::new(DEFAULT_COMMUNITY)
    }
}

/// A single SDCP request
///
/// Frame format:
/// ```text
/// [Version: 1 byte] (always 2)
/// [Category: 1 byte]
/// [Community: 4 bytes ASCII]
/// [Action: 1 byte] (SET=0x00, GET=0x01)
/// [Command: 2 bytes BE]
/// [Data Length: 1 byte] (0 or 2)
/// [Data: 2 bytes BE] (only when data length is 2)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub action: Action,
    pub command_id: u16,
    pub data: Option<u16>,
}

impl CommandFrame {
    #[must_use]
    pub fn get(command_id: u16) -> Self {
        Self {
            action: Action::Get,
            command_id,
            data: None,
        }
    }

    #[must_use]
    pub fn set(command_id: u16, data: u16) -> Self {
        Self {
            action: Action::Set,
            command_id,
            data: Some(data),
        }
    }

    /// SET without a data field, as used by IR key simulation
    #[must_use]
    pub fn bare(command_id: u16) -> Self {
        Self {
            action: Action::Set,
            command_id,
            data: None,
        }
    }

    /// Serialize the request with the given header
    pub fn encode(&self, header: &FrameHeader) -> Result<BytesMut, ProtocolError> {
        encode_frame(header, self.action as u8, self.command_id, self.data)
    }

    /// Parse a request frame as received by a projector
    pub fn decode(data: &[u8]) -> Result<(FrameHeader, Self), ProtocolError> {
        let raw = ResponseFrame::decode(data)?;
        let action = Action::from_u8(data[6])
            .ok_or_else(|| ProtocolError::Decoding(format!("unknown action {:#04X}", data[6])))?;
        let frame = Self {
            action,
            command_id: raw.command_id,
            data: raw.data,
        };
        Ok((raw.header, frame))
    }
}

/// A decoded SDCP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub header: FrameHeader,
    pub success: bool,
    pub command_id: u16,
    /// Present when the declared data length is non-zero. Carries the
    /// error code when `success` is false.
    pub data: Option<u16>,
}

impl ResponseFrame {
    /// Serialize a response the way a projector sends it
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        encode_frame(
            &self.header,
            u8::from(self.success),
            self.command_id,
            self.data,
        )
    }

    /// Parse a response frame
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::FrameTooShort(data.len()));
        }

        let header = FrameHeader {
            version: data[0],
            category: data[1],
            community: String::from_utf8_lossy(&data[2..6]).into_owned(),
        };
        let success = data[6] != 0;
        let command_id = u16::from_be_bytes([data[7], data[8]]);

        let value = if data[9] == 0 {
            None
        } else {
            if data.len() < HEADER_SIZE + DATA_SIZE {
                return Err(ProtocolError::Decoding(format!(
                    "declared data length {} but frame has {} bytes",
                    data[9],
                    data.len()
                )));
            }
            Some(u16::from_be_bytes([data[10], data[11]]))
        };

        Ok(Self {
            header,
            success,
            command_id,
            data: value,
        })
    }
}

fn encode_frame(
    header: &FrameHeader,
    action_or_status: u8,
    command_id: u16,
    data: Option<u16>,
) -> Result<BytesMut, ProtocolError> {
    let community = header.community_bytes()?;
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + DATA_SIZE);

    buf.put_u8(header.version);
    buf.put_u8(header.category);
    buf.put_slice(&community);
    buf.put_u8(action_or_status);
    buf.put_u16(command_id);

    match data {
        Some(value) => {
            buf.put_u8(DATA_SIZE as u8);
            buf.put_u16(value);
        }
        None => buf.put_u8(0),
    }

    Ok(buf)
}

/// Parse an SDAP advertisement beacon.
///
/// Beacon layout:
/// ```text
/// [0..2]   product short id (ASCII)
/// [2]      version
/// [3]      category
/// [4..8]   community
/// [8..20]  model name, NUL padded
/// [20..24] serial number BE
/// [24..26] power state BE
/// [26..]   installation location
/// ```
pub fn decode_advertisement(
    data: &[u8],
    source_ip: &str,
) -> Result<(FrameHeader, AdvertisementInfo), ProtocolError> {
    if data.len() < MIN_ADVERTISEMENT_SIZE {
        tracing::error!(
            "Malformed SDAP beacon from {}: {} bytes",
            source_ip,
            data.len()
        );
        return Err(ProtocolError::Decoding(format!(
            "advertisement too short: {} bytes",
            data.len()
        )));
    }

    let header = FrameHeader {
        version: data[2],
        category: data[3],
        community: String::from_utf8_lossy(&data[4..8]).into_owned(),
    };

    let info = AdvertisementInfo {
        short_id: text_field("short id", &data[0..2])?,
        model_name: text_field("model name", &data[8..20])?,
        serial_number: u32::from_be_bytes([data[20], data[21], data[22], data[23]]),
        power_state: u16::from_be_bytes([data[24], data[25]]),
        location: text_field("location", &data[26..])?,
        source_ip: source_ip.to_string(),
    };

    Ok((header, info))
}

/// Serialize an SDAP beacon
pub fn encode_advertisement(
    header: &FrameHeader,
    info: &AdvertisementInfo,
) -> Result<BytesMut, ProtocolError> {
    let community = header.community_bytes()?;
    let short_id = info.short_id.as_bytes();
    let model = info.model_name.as_bytes();
    if short_id.len() != 2 {
        return Err(ProtocolError::Encoding(format!(
            "short id must be 2 bytes, got {:?}",
            info.short_id
        )));
    }
    if model.len() > 12 {
        return Err(ProtocolError::Encoding(format!(
            "model name longer than 12 bytes: {:?}",
            info.model_name
        )));
    }

    let mut buf = BytesMut::with_capacity(MIN_ADVERTISEMENT_SIZE + info.location.len());
    buf.put_slice(short_id);
    buf.put_u8(header.version);
    buf.put_u8(header.category);
    buf.put_slice(&community);
    buf.put_slice(model);
    buf.put_bytes(0, 12 - model.len());
    buf.put_u32(info.serial_number);
    buf.put_u16(info.power_state);
    buf.put_slice(info.location.as_bytes());

    Ok(buf)
}

/// Decode a NUL padded text field
fn text_field(name: &str, raw: &[u8]) -> Result<String, ProtocolError> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end])
        .map(str::to_string)
        .map_err(|e| ProtocolError::Decoding(format!("invalid {name} in advertisement: {e}")))
}
