//! Sony SDCP (PJ Talk) protocol implementation
//!
//! This crate implements the binary TCP command protocol and the SDAP UDP
//! advertisement beacon used to control Sony VPL projectors over a LAN.

pub mod commands;
pub mod frame;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod transport;
pub mod types;

pub use commands::{Action, Hdr, Input, IrCode, Item, PowerStatus};
pub use frame::{decode_advertisement, CommandFrame, FrameHeader, ResponseFrame};
pub use transport::{discover, discover_host, Request, SdcpClient, DEFAULT_TIMEOUT, DISCOVERY_TIMEOUT};
pub use types::*;
