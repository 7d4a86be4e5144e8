//! Session configuration
//!
//! Nothing is persisted and nothing is read from the environment; both
//! configs are built from command-line arguments.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use framecast_proto::DEFAULT_MAX_PAYLOAD;

pub const DEFAULT_PORT: u16 = 8000;

/// JPEG quality used by the sender (0-100)
pub const JPEG_QUALITY: u8 = 70;

/// Capture resolution; lower means a faster stream
pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 480;

/// How often a listener waiting for its peer checks the shutdown flag
pub const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Receive deadline that lets the client poll its quit key while idle
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct TransmitterConfig {
    pub bind_addr: SocketAddr,
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
    /// Encoded frames above this size are skipped rather than sent
    pub max_payload: usize,
}

impl TransmitterConfig {
    /// Listen on all interfaces on `port`
    pub fn on_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            ..Self::default()
        }
    }
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            jpeg_quality: JPEG_QUALITY,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// `host:port` of the transmitter
    pub server_addr: String,
    /// `None` blocks on reads indefinitely
    pub read_timeout: Option<Duration>,
    /// Frames announcing more than this end the session with an error
    pub max_payload: usize,
}

impl ReceiverConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            server_addr: format!("{host}:{port}"),
            read_timeout: Some(READ_TIMEOUT),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}
