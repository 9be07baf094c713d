//! Link layer
//!
//! A `Link` carries MAVFTP requests to one device and returns its replies.
//! Concrete links speak MAVLink over UDP, TCP or a serial port; the loopback link serves an
//! in-process device for tests.

pub mod loopback;
pub mod mavlink_link;
pub mod session;
pub mod transport;

use log::info;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::mavlink::FrameEncoder;
use crate::protocol::FtpPacket;

pub use loopback::{FaultPlan, LoopbackLink};
pub use mavlink_link::MavlinkLink;
pub use session::Session;
pub use transport::{SerialTransport, TcpTransport, Transport, UdpTransport};

/// MAVLink identity of the device answering on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerIdentity {
    pub system_id: u8,
    pub component_id: u8,
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system {}, component {}", self.system_id, self.component_id)
    }
}

/// Parameters of the restart command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestartParams {
    pub param1: f32,
    pub param6: f32,
}

/// Request/response channel to one device.
pub trait Link {
    /// Largest data field a single request or reply may carry.
    fn max_payload(&self) -> usize;

    /// Blocks until the device announces itself.
    fn await_peer_handshake(&mut self, timeout: Duration) -> Result<PeerIdentity, LinkError>;

    /// Sends one request and waits for the matching reply.
    fn send_command(&mut self, request: &FtpPacket, timeout: Duration)
    -> Result<FtpPacket, LinkError>;

    /// Sends the restart command without waiting for acknowledgment.
    fn send_restart(&mut self, params: &RestartParams) -> Result<(), LinkError>;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn max_payload(&self) -> usize {
        (**self).max_payload()
    }

    fn await_peer_handshake(&mut self, timeout: Duration) -> Result<PeerIdentity, LinkError> {
        (**self).await_peer_handshake(timeout)
    }

    fn send_command(
        &mut self,
        request: &FtpPacket,
        timeout: Duration,
    ) -> Result<FtpPacket, LinkError> {
        (**self).send_command(request, timeout)
    }

    fn send_restart(&mut self, params: &RestartParams) -> Result<(), LinkError> {
        (**self).send_restart(params)
    }
}

/// Baud rate used when a serial descriptor names none.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Where to reach the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDescriptor {
    /// Listen on a local UDP address and answer whoever talks to us.
    UdpIn(String),
    /// Send to a fixed remote UDP address.
    UdpOut(String),
    Tcp(String),
    Serial { path: String, baud: u32 },
}

fn is_com_port(s: &str) -> bool {
    match (s.get(..3), s.get(3..)) {
        (Some(prefix), Some(number)) => {
            prefix.eq_ignore_ascii_case("com")
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn parse_serial(target: &str, original: &str) -> Result<ConnectionDescriptor, LinkError> {
    let (path, baud) = match target.rsplit_once(':') {
        Some((path, baud)) if !path.is_empty() && baud.chars().all(|c| c.is_ascii_digit()) => {
            let baud = baud
                .parse()
                .map_err(|_| LinkError::UnsupportedDescriptor(original.to_string()))?;
            (path, baud)
        }
        _ => (target, DEFAULT_BAUD),
    };
    if path.is_empty() || baud == 0 {
        return Err(LinkError::UnsupportedDescriptor(original.to_string()));
    }
    Ok(ConnectionDescriptor::Serial {
        path: path.to_string(),
        baud,
    })
}

impl FromStr for ConnectionDescriptor {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("/dev/") || is_com_port(s) {
            return parse_serial(s, s);
        }
        if let Some(target) = s.strip_prefix("serial:") {
            return parse_serial(target, s);
        }
        let (scheme, address) = s
            .split_once(':')
            .ok_or_else(|| LinkError::UnsupportedDescriptor(s.to_string()))?;
        if address.is_empty() || !address.contains(':') {
            return Err(LinkError::UnsupportedDescriptor(s.to_string()));
        }
        match scheme.to_ascii_lowercase().as_str() {
            "udp" | "udpin" => Ok(ConnectionDescriptor::UdpIn(address.to_string())),
            "udpout" => Ok(ConnectionDescriptor::UdpOut(address.to_string())),
            "tcp" => Ok(ConnectionDescriptor::Tcp(address.to_string())),
            _ => Err(LinkError::UnsupportedDescriptor(s.to_string())),
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionDescriptor::UdpIn(addr) => write!(f, "udpin:{}", addr),
            ConnectionDescriptor::UdpOut(addr) => write!(f, "udpout:{}", addr),
            ConnectionDescriptor::Tcp(addr) => write!(f, "tcp:{}", addr),
            ConnectionDescriptor::Serial { path, baud } => write!(f, "serial:{}:{}", path, baud),
        }
    }
}

/// Opens the channel named by `descriptor`.
pub fn connect(
    descriptor: &ConnectionDescriptor,
    config: &LinkConfig,
) -> Result<Box<dyn Link>, LinkError> {
    let encoder = FrameEncoder::new(config.system_id, config.component_id);
    let connect_error = |e: std::io::Error| LinkError::Connect(descriptor.to_string(), e);

    let link: Box<dyn Link> = match descriptor {
        ConnectionDescriptor::UdpIn(addr) => Box::new(MavlinkLink::new(
            UdpTransport::bind(addr).map_err(connect_error)?,
            encoder,
            config.system_id,
        )),
        ConnectionDescriptor::UdpOut(addr) => Box::new(MavlinkLink::new(
            UdpTransport::connect(addr).map_err(connect_error)?,
            encoder,
            config.system_id,
        )),
        ConnectionDescriptor::Tcp(addr) => Box::new(MavlinkLink::new(
            TcpTransport::connect(addr).map_err(connect_error)?,
            encoder,
            config.system_id,
        )),
        ConnectionDescriptor::Serial { path, baud } => Box::new(MavlinkLink::new(
            SerialTransport::open(path, *baud).map_err(connect_error)?,
            encoder,
            config.system_id,
        )),
    };

    info!("Opened link {}", descriptor);
    Ok(link)
}
