//! Byte transports under the MAVLink link
//!
//! Blocking std sockets and serial ports with per-call read timeouts.

use log::info;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Moves raw bytes to and from the device.
pub trait Transport {
    /// Whether `send` has somewhere to deliver bytes yet.
    fn has_peer(&self) -> bool;

    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads whatever arrives within `timeout`; times out with
    /// `WouldBlock` or `TimedOut`.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

fn resolve(addr: &str) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("cannot resolve {}", addr))
    })
}

/// UDP datagrams, either listening (peer learned from the first sender) or
/// sending to a fixed address.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    learn_peer: bool,
}

impl UdpTransport {
    pub fn bind(addr: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(resolve(addr)?)?;
        info!("Listening for the device on udp {}", socket.local_addr()?);
        Ok(Self {
            socket,
            peer: None,
            learn_peer: true,
        })
    }

    pub fn connect(addr: &str) -> io::Result<Self> {
        let peer = resolve(addr)?;
        let local: SocketAddr = if peer.is_ipv4() {
            "0.0.0.0:0".parse().map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?
        } else {
            "[::]:0".parse().map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?
        };
        let socket = UdpSocket::bind(local)?;
        Ok(Self {
            socket,
            peer: Some(peer),
            learn_peer: false,
        })
    }
}

impl Transport for UdpTransport {
    fn has_peer(&self) -> bool {
        self.peer.is_some()
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let peer = self
            .peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no UDP peer yet"))?;
        self.socket.send_to(bytes, peer)?;
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.socket
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        let (n, from) = self.socket.recv_from(buf)?;
        if self.learn_peer && self.peer != Some(from) {
            info!("Device traffic from {}", from);
            self.peer = Some(from);
        }
        Ok(n)
    }
}

/// A TCP byte stream, e.g. a SITL instance.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(resolve(addr)?)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn has_peer(&self) -> bool {
        true
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.stream
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        match self.stream.read(buf)? {
            0 => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "device closed the connection",
            )),
            n => Ok(n),
        }
    }
}

/// A serial port, e.g. the autopilot's USB CDC device.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, baud: u32) -> io::Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(MIN_READ_TIMEOUT)
            .open()
            .map_err(io::Error::from)?;
        info!("Opened serial port {} at {} baud", path, baud);
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn has_peer(&self) -> bool {
        true
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port
            .set_timeout(timeout.max(MIN_READ_TIMEOUT))
            .map_err(io::Error::from)?;
        match self.port.read(buf)? {
            0 => Err(io::Error::from(io::ErrorKind::TimedOut)),
            n => Ok(n),
        }
    }
}
