//! Link session
//!
//! A `Session` is a link whose device has completed the heartbeat handshake.
//! It owns the request sequence counter and is passed by `&mut` to every
//! transfer operation, so only one exchange can be in flight at a time.

use log::info;
use std::time::Duration;

use crate::error::LinkError;
use crate::link::{Link, PeerIdentity, RestartParams};
use crate::protocol::FtpPacket;

pub struct Session<L: Link> {
    link: L,
    peer: PeerIdentity,
    next_seq: u16,
}

impl<L: Link> Session<L> {
    /// Waits for the device heartbeat; no protocol operation is possible
    /// before it arrives.
    pub fn establish(mut link: L, handshake_timeout: Duration) -> Result<Self, LinkError> {
        let peer = link.await_peer_handshake(handshake_timeout)?;
        info!("Session established with {}", peer);
        Ok(Self {
            link,
            peer,
            next_seq: 0,
        })
    }

    pub fn peer(&self) -> PeerIdentity {
        self.peer
    }

    pub fn max_payload(&self) -> usize {
        self.link.max_payload()
    }

    /// Assigns the next sequence number to a new request. Retransmissions
    /// reuse the stamped packet unchanged.
    pub fn stamp(&mut self, mut request: FtpPacket) -> FtpPacket {
        request.seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        request
    }

    pub fn send_command(
        &mut self,
        request: &FtpPacket,
        timeout: Duration,
    ) -> Result<FtpPacket, LinkError> {
        self.link.send_command(request, timeout)
    }

    pub fn request_restart(&mut self, params: &RestartParams) -> Result<(), LinkError> {
        self.link.send_restart(params)
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }
}
