//! Async TCP client and UDP discovery for SDCP projectors
//!
//! Every request opens a fresh TCP connection, sends one frame, reads at most
//! one response and closes. There is no session state on either side beyond
//! the community string carried in each frame.

use crate::commands::{Hdr, Input, IrCode, Item, PictureMuting, PowerCommand, PowerStatus};
use crate::frame::{decode_advertisement, CommandFrame, FrameHeader, ResponseFrame, DATA_SIZE, HEADER_SIZE};
use crate::types::{AdvertisementInfo, ProjectorEndpoint, ProtocolError};

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::Instant;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default discovery window. Projectors may advertise only every 30 seconds.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(31);

/// Largest SDAP beacon accepted
const MAX_ADVERTISEMENT_SIZE: usize = 1024;

/// One request and whether the projector answers it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub frame: CommandFrame,
    pub expects_response: bool,
}

impl Request {
    #[must_use]
    pub fn get(item: Item) -> Self {
        Self {
            frame: CommandFrame::get(item.id()),
            expects_response: true,
        }
    }

    #[must_use]
    pub fn set(item: Item, value: u16) -> Self {
        Self {
            frame: CommandFrame::set(item.id(), value),
            expects_response: true,
        }
    }

    /// Simulated IR key press, never acknowledged by the projector
    #[must_use]
    pub fn ir(code: IrCode) -> Self {
        Self {
            frame: CommandFrame::bare(code.id()),
            expects_response: false,
        }
    }
}

/// Client for a single projector
#[derive(Debug, Clone)]
pub struct SdcpClient {
    endpoint: ProjectorEndpoint,
    header: FrameHeader,
    timeout: Duration,
}

impl SdcpClient {
    #[must_use]
    pub fn new(endpoint: ProjectorEndpoint) -> Self {
        let header = FrameHeader::new(endpoint.community.clone());
        Self {
            endpoint,
            header,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &ProjectorEndpoint {
        &self.endpoint
    }

    /// Send a request and return the response data field.
    ///
    /// Requests that expect no response return `Ok(None)` once the frame is
    /// written. A failure response is mapped through the device error table.
    pub async fn send(&self, request: Request) -> Result<Option<u16>, ProtocolError> {
        let data = request.frame.encode(&self.header)?;
        tracing::debug!(
            "SDCP -> {}: {:02X?}",
            self.endpoint.tcp_addr(),
            &data[..]
        );

        match tokio::time::timeout(self.timeout, self.exchange(&data, request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(
                    "SDCP request {:#06X} to {} timed out",
                    request.frame.command_id,
                    self.endpoint.tcp_addr()
                );
                Err(ProtocolError::Timeout)
            }
        }
    }

    async fn exchange(&self, data: &[u8], request: Request) -> Result<Option<u16>, ProtocolError> {
        let mut stream = TcpStream::connect(self.endpoint.tcp_addr()).await?;

        let sent = stream.write(data).await?;
        if sent != data.len() {
            return Err(ProtocolError::PartialSend {
                sent,
                expected: data.len(),
            });
        }

        if !request.expects_response {
            return Ok(None);
        }

        let mut buf = [0u8; HEADER_SIZE + DATA_SIZE];
        stream.read_exact(&mut buf[..HEADER_SIZE]).await?;
        let len = if buf[HEADER_SIZE - 1] == 0 {
            HEADER_SIZE
        } else {
            stream.read_exact(&mut buf[HEADER_SIZE..]).await?;
            HEADER_SIZE + DATA_SIZE
        };
        tracing::debug!("SDCP <- {}: {:02X?}", self.endpoint.tcp_addr(), &buf[..len]);

        let response = ResponseFrame::decode(&buf[..len])?;
        if !response.success {
            let err = ProtocolError::rejected(
                request.frame.command_id,
                response.data.unwrap_or_default(),
            );
            tracing::error!("{}", err);
            return Err(err);
        }

        Ok(response.data)
    }

    /// Check that the SDCP port accepts connections
    pub async fn probe(&self) -> Result<(), ProtocolError> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(self.endpoint.tcp_addr())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ProtocolError::Connection(e)),
            Err(_) => Err(ProtocolError::Timeout),
        }
    }

    async fn get_value(&self, item: Item) -> Result<u16, ProtocolError> {
        self.send(Request::get(item)).await?.ok_or_else(|| {
            ProtocolError::Decoding(format!("no data in response to {:#06X}", item.id()))
        })
    }

    /// Write a setting value
    pub async fn set(&self, item: Item, value: u16) -> Result<(), ProtocolError> {
        self.send(Request::set(item, value)).await.map(|_| ())
    }

    /// Send a simulated IR key
    pub async fn send_ir(&self, code: IrCode) -> Result<(), ProtocolError> {
        self.send(Request::ir(code)).await.map(|_| ())
    }

    /// Whether the projector is on. Standby and cooling count as off.
    pub async fn get_power(&self) -> Result<bool, ProtocolError> {
        let status = self.get_value(Item::StatusPower).await?;
        Ok(PowerStatus::is_on(status))
    }

    pub async fn set_power(&self, on: bool) -> Result<(), ProtocolError> {
        let value = if on { PowerCommand::On } else { PowerCommand::Off };
        self.set(Item::SetPower, value as u16).await
    }

    /// Whether picture muting is active
    pub async fn get_muting(&self) -> Result<bool, ProtocolError> {
        let value = self.get_value(Item::PictureMuting).await?;
        Ok(value == PictureMuting::On as u16)
    }

    pub async fn set_muting(&self, muted: bool) -> Result<(), ProtocolError> {
        let value = if muted { PictureMuting::On } else { PictureMuting::Off };
        self.set(Item::PictureMuting, value as u16).await
    }

    /// Current input, `None` for anything other than HDMI 1 or 2
    pub async fn get_input(&self) -> Result<Option<Input>, ProtocolError> {
        let value = self.get_value(Item::Input).await?;
        Ok(Input::from_u16(value))
    }

    pub async fn set_input(&self, input: Input) -> Result<(), ProtocolError> {
        self.set(Item::Input, input as u16).await
    }

    /// Lamp timer in hours
    pub async fn get_lamp_hours(&self) -> Result<u16, ProtocolError> {
        self.get_value(Item::StatusLampTimer).await
    }

    pub async fn get_hdr(&self) -> Result<Hdr, ProtocolError> {
        let value = self.get_value(Item::Hdr).await?;
        Hdr::from_u16(value)
            .ok_or_else(|| ProtocolError::Decoding(format!("unknown HDR value {value:#06X}")))
    }

    /// Raw error status word
    pub async fn get_error_status(&self) -> Result<u16, ProtocolError> {
        self.get_value(Item::StatusError).await
    }
}

/// Wait for one SDAP beacon on `udp_port`.
///
/// An empty `bind_address` listens on all interfaces.
pub async fn discover(
    udp_port: u16,
    bind_address: &str,
    timeout: Duration,
) -> Result<AdvertisementInfo, ProtocolError> {
    let socket = bind_discovery(udp_port, bind_address).await?;
    receive_advertisement(&socket, None, timeout).await
}

/// Wait for a beacon sent from a specific projector address
pub async fn discover_host(
    ip: &str,
    udp_port: u16,
    bind_address: &str,
    timeout: Duration,
) -> Result<AdvertisementInfo, ProtocolError> {
    let socket = bind_discovery(udp_port, bind_address).await?;
    receive_advertisement(&socket, Some(ip), timeout).await
}

async fn bind_discovery(udp_port: u16, bind_address: &str) -> Result<UdpSocket, ProtocolError> {
    let host = if bind_address.is_empty() {
        "0.0.0.0"
    } else {
        bind_address
    };
    tracing::info!("Listening for SDAP beacons on {}:{}", host, udp_port);
    Ok(UdpSocket::bind(format!("{host}:{udp_port}")).await?)
}

/// Receive and decode beacons on an already bound socket until one matches
/// `from_ip` (or any, when `None`) or the timeout expires
pub async fn receive_advertisement(
    socket: &UdpSocket,
    from_ip: Option<&str>,
    timeout: Duration,
) -> Result<AdvertisementInfo, ProtocolError> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; MAX_ADVERTISEMENT_SIZE];

    loop {
        let (len, addr) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("No SDAP beacon received within {:?}", timeout);
                return Err(ProtocolError::Timeout);
            }
        };

        let source = addr.ip().to_string();
        if from_ip.is_some_and(|ip| ip != source) {
            tracing::debug!("Ignoring SDAP beacon from {}", source);
            continue;
        }

        let (header, info) = decode_advertisement(&buf[..len], &source)?;
        tracing::info!(
            "Discovered {} (serial {}) at {} with community {}",
            info.model_name,
            info.serial_number,
            source,
            header.community
        );
        return Ok(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_advertisement;
    use crate::mock::MockProjector;

    fn beacon(model: &str, serial: u32) -> Vec<u8> {
        let info = AdvertisementInfo {
            short_id: "DA".to_string(),
            model_name: model.to_string(),
            serial_number: serial,
            power_state: 0,
            location: String::new(),
            source_ip: String::new(),
        };
        encode_advertisement(&FrameHeader::default(), &info)
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_power_round_trip() {
        let mock = MockProjector::start("SONY").await.unwrap();
        let client = SdcpClient::new(mock.endpoint());

        assert!(!client.get_power().await.unwrap());
        client.set_power(true).await.unwrap();
        assert!(client.get_power().await.unwrap());
        client.set_power(false).await.unwrap();
        assert!(!client.get_power().await.unwrap());
    }

    #[tokio::test]
    async fn test_input_and_muting() {
        let mock = MockProjector::start("SONY").await.unwrap();
        let client = SdcpClient::new(mock.endpoint());

        client.set_input(Input::Hdmi2).await.unwrap();
        assert_eq!(client.get_input().await.unwrap(), Some(Input::Hdmi2));

        client.set_muting(true).await.unwrap();
        assert!(client.get_muting().await.unwrap());
    }

    #[tokio::test]
    async fn test_lamp_hours() {
        let mock = MockProjector::start("SONY").await.unwrap();
        mock.set_value(Item::StatusLampTimer, 1234);
        let client = SdcpClient::new(mock.endpoint());
        assert_eq!(client.get_lamp_hours().await.unwrap(), 1234);
    }

    #[tokio::test]
    async fn test_community_mismatch_is_rejected() {
        let mock = MockProjector::start("ABCD").await.unwrap();
        let endpoint = mock.endpoint().with_community("SONY");
        let client = SdcpClient::new(endpoint);

        let err = client.set_power(true).await.unwrap_err();
        match err {
            ProtocolError::Rejected { code, reason, .. } => {
                assert_eq!(code, 0x0201);
                assert_eq!(reason, "Different Community");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ir_command_does_not_wait() {
        let mock = MockProjector::start("SONY").await.unwrap();
        let client = SdcpClient::new(mock.endpoint()).with_timeout(Duration::from_millis(500));

        let result = client.send(Request::ir(IrCode::Menu)).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_repeated_set_is_idempotent() {
        let mock = MockProjector::start("SONY").await.unwrap();
        let client = SdcpClient::new(mock.endpoint());

        for _ in 0..3 {
            client.set_muting(true).await.unwrap();
        }
        assert!(client.get_muting().await.unwrap());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = SdcpClient::new(ProjectorEndpoint::new("127.0.0.1").with_tcp_port(port));
        let result = client.get_power().await;
        assert!(matches!(result, Err(ProtocolError::Connection(_))));
        assert!(client.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_receive_advertisement() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&beacon("VPL-VW270", 42), addr).await.unwrap();

        let info = receive_advertisement(&socket, None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(info.model_name, "VPL-VW270");
        assert_eq!(info.serial_number, 42);
        assert_eq!(info.source_ip, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_receive_advertisement_filters_source() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&beacon("VPL-VW270", 42), addr).await.unwrap();

        let result =
            receive_advertisement(&socket, Some("10.1.2.3"), Duration::from_millis(200)).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn test_discovery_timeout() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let result = receive_advertisement(&socket, None, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }
}
