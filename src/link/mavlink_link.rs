//! MAVLink link
//!
//! Wraps MAVFTP packets in FILE_TRANSFER_PROTOCOL messages over any
//! `Transport`, identifies the device from its heartbeat, and matches replies
//! to requests by sequence number.

use log::{debug, info};
use std::time::{Duration, Instant};

use crate::error::LinkError;
use crate::link::transport::Transport;
use crate::link::{Link, PeerIdentity, RestartParams};
use crate::mavlink::messages::MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN;
use crate::mavlink::{
    CommandLong, FileTransferProtocol, Frame, FrameDecoder, FrameEncoder, Heartbeat, Message,
};
use crate::protocol::{FtpPacket, MAX_DATA_LEN};

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);
const RECV_BUFFER_LEN: usize = 4096;
const STALL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct MavlinkLink<T: Transport> {
    transport: T,
    encoder: FrameEncoder,
    decoder: FrameDecoder,
    system_id: u8,
    peer: Option<PeerIdentity>,
    buf: Vec<u8>,
}

impl<T: Transport> MavlinkLink<T> {
    pub fn new(transport: T, encoder: FrameEncoder, system_id: u8) -> Self {
        Self {
            transport,
            encoder,
            decoder: FrameDecoder::new(),
            system_id,
            peer: None,
            buf: vec![0u8; RECV_BUFFER_LEN],
        }
    }

    fn send_message(&mut self, message: &Message) -> Result<(), LinkError> {
        let bytes = self.encoder.encode(message);
        self.transport.send(&bytes).map_err(LinkError::Io)
    }

    /// Reads until a frame decodes or `deadline` passes. A partial frame
    /// that receives no bytes for `STALL_TIMEOUT` loses its start marker.
    fn read_frame(&mut self, deadline: Instant) -> Result<Frame, LinkError> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(LinkError::Timeout);
            }
            let wait = if self.decoder.has_partial() {
                (deadline - now).min(STALL_TIMEOUT)
            } else {
                deadline - now
            };
            match self.transport.recv(&mut self.buf, wait) {
                Ok(n) => self.decoder.push(&self.buf[..n]),
                Err(e) => match LinkError::from(e) {
                    LinkError::Timeout if self.decoder.has_partial() => {
                        debug!("Discarding stalled partial frame");
                        self.decoder.discard_stalled();
                    }
                    e => return Err(e),
                },
            }
        }
    }

    fn is_for_us(&self, ftp: &FileTransferProtocol) -> bool {
        ftp.target_system == 0 || ftp.target_system == self.system_id
    }
}

impl<T: Transport> Link for MavlinkLink<T> {
    fn max_payload(&self) -> usize {
        MAX_DATA_LEN
    }

    fn await_peer_handshake(&mut self, timeout: Duration) -> Result<PeerIdentity, LinkError> {
        let deadline = Instant::now() + timeout;
        let mut next_beat = Instant::now();

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(LinkError::HandshakeTimeout(timeout));
            }
            if now >= next_beat {
                if self.transport.has_peer() {
                    self.send_message(&Message::Heartbeat(Heartbeat::gcs()))?;
                }
                next_beat = now + HEARTBEAT_PERIOD;
            }

            match self.read_frame(deadline.min(next_beat)) {
                Ok(Frame {
                    system_id,
                    component_id,
                    message: Message::Heartbeat(heartbeat),
                    ..
                }) if !heartbeat.is_gcs() => {
                    let peer = PeerIdentity {
                        system_id,
                        component_id,
                    };
                    info!("Heartbeat from {}", peer);
                    self.peer = Some(peer);
                    return Ok(peer);
                }
                Ok(_) | Err(LinkError::Timeout) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn send_command(
        &mut self,
        request: &FtpPacket,
        timeout: Duration,
    ) -> Result<FtpPacket, LinkError> {
        let peer = self.peer.ok_or(LinkError::PeerUnknown)?;
        let message = Message::FileTransferProtocol(FileTransferProtocol {
            target_network: 0,
            target_system: peer.system_id,
            target_component: peer.component_id,
            payload: request.encode()?,
        });
        self.send_message(&message)?;

        let deadline = Instant::now() + timeout;
        let expected_seq = request.expected_reply_seq();
        loop {
            let frame = self.read_frame(deadline)?;
            let Message::FileTransferProtocol(ftp) = &frame.message else {
                continue;
            };
            if frame.system_id != peer.system_id || !self.is_for_us(ftp) {
                continue;
            }
            match FtpPacket::decode(&ftp.payload) {
                Ok(reply) if reply.seq == expected_seq && reply.opcode.is_reply() => {
                    return Ok(reply);
                }
                Ok(reply) => debug!(
                    "Discarding stale {} seq {} (waiting for {})",
                    reply.opcode, reply.seq, expected_seq
                ),
                Err(e) => debug!("Discarding undecodable FTP payload: {}", e),
            }
        }
    }

    fn send_restart(&mut self, params: &RestartParams) -> Result<(), LinkError> {
        let peer = self.peer.ok_or(LinkError::PeerUnknown)?;
        let command = CommandLong {
            params: [params.param1, 0.0, 0.0, 0.0, 0.0, params.param6, 0.0],
            command: MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN,
            target_system: peer.system_id,
            target_component: peer.component_id,
            confirmation: 0,
        };
        self.send_message(&Message::CommandLong(command))?;
        info!("Restart command sent to {}", peer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Opcode;
    use std::collections::VecDeque;
    use std::io;

    /// Replays scripted reads; `None` is a read timeout.
    struct ScriptedTransport {
        reads: VecDeque<Option<Vec<u8>>>,
        sent: Vec<Vec<u8>>,
    }

    impl Transport for ScriptedTransport {
        fn has_peer(&self) -> bool {
            true
        }

        fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.sent.push(bytes.to_vec());
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
            match self.reads.pop_front().flatten() {
                Some(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            }
        }
    }

    fn device_frame(message: Message) -> Vec<u8> {
        FrameEncoder::new(1, 1).encode(&message)
    }

    #[test]
    fn reply_behind_stalled_partial_frame_is_delivered() {
        let request = FtpPacket::request(Opcode::ListDirectory).with_data(b"/".to_vec());
        let reply = FtpPacket::ack(&request);
        let reply_frame = device_frame(Message::FileTransferProtocol(FileTransferProtocol {
            target_network: 0,
            target_system: 255,
            target_component: 190,
            payload: reply.encode().unwrap(),
        }));

        let transport = ScriptedTransport {
            reads: VecDeque::from([
                Some(device_frame(Message::Heartbeat(Heartbeat::autopilot()))),
                // start of an unmodelled 200-byte message that never completes
                Some(vec![0xFD, 200, 0, 0, 0, 1, 1, 30, 0, 0]),
                None,
                Some(reply_frame),
            ]),
            sent: Vec::new(),
        };
        let mut link = MavlinkLink::new(transport, FrameEncoder::new(255, 190), 255);

        let peer = link.await_peer_handshake(Duration::from_secs(1)).unwrap();
        assert_eq!(peer.system_id, 1);
        let received = link.send_command(&request, Duration::from_secs(1)).unwrap();
        assert_eq!(received, reply);
    }

    #[test]
    fn stale_replies_are_discarded() {
        let mut request = FtpPacket::request(Opcode::OpenFileRO).with_data(b"/a".to_vec());
        request.seq = 5;
        let mut stale = FtpPacket::ack(&request);
        stale.seq = 4;
        let fresh = FtpPacket::ack(&request);
        let frame = |packet: &FtpPacket| {
            device_frame(Message::FileTransferProtocol(FileTransferProtocol {
                target_network: 0,
                target_system: 255,
                target_component: 190,
                payload: packet.encode().unwrap(),
            }))
        };

        let transport = ScriptedTransport {
            reads: VecDeque::from([
                Some(device_frame(Message::Heartbeat(Heartbeat::autopilot()))),
                Some(frame(&stale)),
                Some(frame(&fresh)),
            ]),
            sent: Vec::new(),
        };
        let mut link = MavlinkLink::new(transport, FrameEncoder::new(255, 190), 255);
        link.await_peer_handshake(Duration::from_secs(1)).unwrap();

        assert_eq!(link.send_command(&request, Duration::from_secs(1)).unwrap(), fresh);
    }
}
