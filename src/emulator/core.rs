use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::config::EmulatorConfig;
use crate::device::{DeviceStorage, FtpDevice};
use crate::mavlink::messages::MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN;
use crate::mavlink::{FileTransferProtocol, Frame, FrameDecoder, FrameEncoder, Heartbeat, Message};
use crate::protocol::FtpPacket;

const RECV_BUFFER_LEN: usize = 2048;

/// A client the emulator has heard from.
struct Peer {
    decoder: FrameDecoder,
    last_seen: Instant,
}

impl Peer {
    fn new(now: Instant) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            last_seen: now,
        }
    }
}

type Peers = Arc<Mutex<HashMap<SocketAddr, Peer>>>;

/// UDP endpoint answering MAVFTP like an autopilot, backed by a directory.
pub struct Emulator {
    socket: Arc<UdpSocket>,
    device: Arc<Mutex<FtpDevice>>,
    encoder: Arc<Mutex<FrameEncoder>>,
    peers: Peers,
    config: Arc<EmulatorConfig>,
}

impl Emulator {
    pub async fn bind(
        addr: &str,
        root: impl Into<PathBuf>,
        config: EmulatorConfig,
    ) -> std::io::Result<Self> {
        let root = root.into();
        if let Err(e) = std::fs::create_dir_all(&root) {
            warn!("Failed to create device root {}: {}", root.display(), e);
        }

        let socket = UdpSocket::bind(addr).await?;
        info!(
            "Emulator bound to {} serving {} as system {}",
            socket.local_addr()?,
            root.display(),
            config.system_id
        );

        let device = FtpDevice::with_max_payload(DeviceStorage::new(root), config.max_payload);
        Ok(Self {
            socket: Arc::new(socket),
            device: Arc::new(Mutex::new(device)),
            encoder: Arc::new(Mutex::new(FrameEncoder::new(
                config.system_id,
                config.component_id,
            ))),
            peers: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves requests until the socket fails.
    pub async fn run(self) -> std::io::Result<()> {
        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&self.socket),
            Arc::clone(&self.encoder),
            Arc::clone(&self.peers),
            Arc::clone(&self.config),
        ));

        let result = self.serve().await;
        heartbeat.abort();
        result
    }

    async fn serve(&self) -> std::io::Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        loop {
            let (n, from) = self.socket.recv_from(&mut buf).await?;
            let now = Instant::now();

            let (frames, is_new) = {
                let mut peers = self.peers.lock().await;
                let is_new = !peers.contains_key(&from);
                let peer = peers.entry(from).or_insert_with(|| Peer::new(now));
                peer.last_seen = now;
                peer.decoder.push(&buf[..n]);
                let mut frames = Vec::new();
                while let Some(frame) = peer.decoder.next_frame() {
                    frames.push(frame);
                }
                (frames, is_new)
            };

            if is_new {
                info!("New peer {}", from);
                self.send(&Message::Heartbeat(Heartbeat::autopilot()), from)
                    .await;
            }
            for frame in frames {
                self.handle_frame(frame, from).await;
            }
        }
    }

    async fn handle_frame(&self, frame: Frame, from: SocketAddr) {
        match frame.message {
            Message::FileTransferProtocol(ftp) if self.targets_us(ftp.target_system) => {
                let request = match FtpPacket::decode(&ftp.payload) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("Ignoring malformed FTP payload from {}: {}", from, e);
                        return;
                    }
                };
                let reply = self.device.lock().await.handle(&request);
                let payload = match reply.encode() {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Cannot encode reply to {}: {}", request.opcode, e);
                        return;
                    }
                };
                let message = Message::FileTransferProtocol(FileTransferProtocol {
                    target_network: 0,
                    target_system: frame.system_id,
                    target_component: frame.component_id,
                    payload,
                });
                self.send(&message, from).await;
            }
            Message::CommandLong(command)
                if command.command == MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN
                    && self.targets_us(command.target_system) =>
            {
                info!(
                    "Restart requested by system {} (param1 {}, param6 {})",
                    frame.system_id, command.params[0], command.params[5]
                );
                self.device.lock().await.reset_sessions();
            }
            Message::Heartbeat(_) => {
                debug!("Heartbeat from system {} at {}", frame.system_id, from);
            }
            other => debug!("Ignoring message {} from {}", other.id(), from),
        }
    }

    fn targets_us(&self, target_system: u8) -> bool {
        target_system == 0 || target_system == self.config.system_id
    }

    async fn send(&self, message: &Message, to: SocketAddr) {
        let bytes = self.encoder.lock().await.encode(message);
        if let Err(e) = self.socket.send_to(&bytes, to).await {
            warn!("Send to {} failed: {}", to, e);
        }
    }
}

/// Drops peers silent for at least `idle`, along with their decoders.
fn evict_idle(
    peers: &mut HashMap<SocketAddr, Peer>,
    now: Instant,
    idle: Duration,
) -> Vec<SocketAddr> {
    let mut evicted = Vec::new();
    peers.retain(|addr, peer| {
        let keep = now.saturating_duration_since(peer.last_seen) < idle;
        if !keep {
            evicted.push(*addr);
        }
        keep
    });
    evicted
}

async fn heartbeat_loop(
    socket: Arc<UdpSocket>,
    encoder: Arc<Mutex<FrameEncoder>>,
    peers: Peers,
    config: Arc<EmulatorConfig>,
) {
    let mut interval = tokio::time::interval(config.heartbeat_interval());
    loop {
        interval.tick().await;
        let targets: Vec<SocketAddr> = {
            let mut peers = peers.lock().await;
            for addr in evict_idle(&mut peers, Instant::now(), config.peer_idle()) {
                info!("Peer {} went silent, forgetting it", addr);
            }
            peers.keys().copied().collect()
        };
        if targets.is_empty() {
            continue;
        }
        let bytes = encoder
            .lock()
            .await
            .encode(&Message::Heartbeat(Heartbeat::autopilot()));
        for peer in targets {
            if let Err(e) = socket.send_to(&bytes, peer).await {
                warn!("Heartbeat to {} failed: {}", peer, e);
            }
        }
    }
}
