//! Simulated projector for tests
//!
//! Listens on a loopback TCP port and speaks the real SDCP frame format.
//! Settings are kept in a value table, power commands drive the power
//! status, and IR frames (SET without data) are recorded but never answered.

use crate::commands::{Action, Item, PowerStatus};
use crate::frame::{encode_advertisement, CommandFrame, FrameHeader, ResponseFrame, DATA_SIZE, HEADER_SIZE};
use crate::types::{AdvertisementInfo, ErrorCode, ProjectorEndpoint};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;

#[derive(Default)]
struct MockState {
    values: HashMap<u16, u16>,
    rejections: HashMap<u16, u16>,
    requests: Vec<CommandFrame>,
}

/// Loopback SDCP server
pub struct MockProjector {
    port: u16,
    community: String,
    state: Arc<Mutex<MockState>>,
    task: JoinHandle<()>,
}

impl MockProjector {
    /// Start a projector that accepts `community`
    pub async fn start(community: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let mut state = MockState::default();
        state.values.insert(Item::StatusPower.id(), PowerStatus::Standby as u16);
        state.values.insert(Item::Input.id(), 0x0002);
        state.values.insert(Item::PictureMuting.id(), 0x0000);
        state.values.insert(Item::Hdr.id(), 0x0000);
        state.values.insert(Item::StatusLampTimer.id(), 0);
        state.values.insert(Item::StatusError.id(), 0);
        let state = Arc::new(Mutex::new(state));

        let task = tokio::spawn(Self::accept_loop(
            listener,
            community.to_string(),
            state.clone(),
        ));
        tracing::debug!("Mock projector listening on 127.0.0.1:{}", port);

        Ok(Self {
            port,
            community: community.to_string(),
            state,
            task,
        })
    }

    /// Endpoint pointing at this projector with its own community
    #[must_use]
    pub fn endpoint(&self) -> ProjectorEndpoint {
        ProjectorEndpoint::new("127.0.0.1")
            .with_tcp_port(self.port)
            .with_community(self.community.clone())
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Set the value returned for GET requests on `item`
    pub fn set_value(&self, item: Item, value: u16) {
        self.lock().values.insert(item.id(), value);
    }

    #[must_use]
    pub fn value(&self, item: Item) -> Option<u16> {
        self.lock().values.get(&item.id()).copied()
    }

    /// Answer every request for `item` with a failure carrying `code`
    pub fn reject(&self, item: Item, code: ErrorCode) {
        self.lock().rejections.insert(item.id(), code as u16);
    }

    /// Every frame received so far
    #[must_use]
    pub fn requests(&self) -> Vec<CommandFrame> {
        self.lock().requests.clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Broadcast SDAP beacons for this projector to `127.0.0.1:udp_port`
    /// every `interval` until the returned task is aborted
    pub fn spawn_beacon(
        &self,
        udp_port: u16,
        model: &str,
        serial: u32,
        interval: Duration,
    ) -> JoinHandle<()> {
        let header = FrameHeader::new(self.community.clone());
        let info = AdvertisementInfo {
            short_id: "DA".to_string(),
            model_name: model.to_string(),
            serial_number: serial,
            power_state: self
                .value(Item::StatusPower)
                .unwrap_or(PowerStatus::Standby as u16),
            location: String::new(),
            source_ip: String::new(),
        };

        tokio::spawn(async move {
            let packet = match encode_advertisement(&header, &info) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::error!("Mock beacon encoding failed: {}", e);
                    return;
                }
            };
            let Ok(socket) = UdpSocket::bind("127.0.0.1:0").await else {
                return;
            };
            loop {
                if let Err(e) = socket.send_to(&packet, ("127.0.0.1", udp_port)).await {
                    tracing::debug!("Mock beacon send failed: {}", e);
                }
                tokio::time::sleep(interval).await;
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn accept_loop(listener: TcpListener, community: String, state: Arc<Mutex<MockState>>) {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(Self::serve(stream, community.clone(), state.clone()));
        }
    }

    async fn serve(mut stream: TcpStream, community: String, state: Arc<Mutex<MockState>>) {
        let mut buf = [0u8; HEADER_SIZE + DATA_SIZE];
        loop {
            if stream.read_exact(&mut buf[..HEADER_SIZE]).await.is_err() {
                return;
            }
            let len = if buf[HEADER_SIZE - 1] == 0 {
                HEADER_SIZE
            } else {
                if stream.read_exact(&mut buf[HEADER_SIZE..]).await.is_err() {
                    return;
                }
                HEADER_SIZE + DATA_SIZE
            };

            let Ok((header, frame)) = CommandFrame::decode(&buf[..len]) else {
                return;
            };
            let reply = {
                let mut state = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                state.requests.push(frame);
                Self::answer(&mut state, &community, &header, frame)
            };

            let Some(reply) = reply else {
                continue;
            };
            let Ok(bytes) = reply.encode() else {
                return;
            };
            if stream.write_all(&bytes).await.is_err() {
                return;
            }
        }
    }

    fn answer(
        state: &mut MockState,
        community: &str,
        header: &FrameHeader,
        frame: CommandFrame,
    ) -> Option<ResponseFrame> {
        let reply = |success: bool, data: Option<u16>| ResponseFrame {
            header: FrameHeader::new(community.to_string()),
            success,
            command_id: frame.command_id,
            data,
        };

        if header.community != community {
            return Some(reply(false, Some(ErrorCode::DifferentCommunity as u16)));
        }
        if let Some(&code) = state.rejections.get(&frame.command_id) {
            return Some(reply(false, Some(code)));
        }

        match (frame.action, frame.data) {
            // IR key simulation
            (Action::Set, None) => None,
            (Action::Set, Some(value)) => {
                if frame.command_id == Item::SetPower.id() {
                    let status = if value == 0 {
                        PowerStatus::Standby
                    } else {
                        PowerStatus::PowerOn
                    };
                    state.values.insert(Item::StatusPower.id(), status as u16);
                } else {
                    state.values.insert(frame.command_id, value);
                }
                Some(reply(true, None))
            }
            (Action::Get, _) => match state.values.get(&frame.command_id) {
                Some(&value) => Some(reply(true, Some(value))),
                None => Some(reply(false, Some(ErrorCode::InvalidItem as u16))),
            },
        }
    }
}

impl Drop for MockProjector {
    fn drop(&mut self) {
        self.task.abort();
    }
}
