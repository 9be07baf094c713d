//! In-process link to an emulated device
//!
//! Every request goes straight to an `FtpDevice`. A `FaultPlan` can lose
//! replies (the device still processes the request) or shorten read replies,
//! which is how lossy links and silent corruption are reproduced in tests.
//! Lost replies surface immediately as `LinkError::Timeout`.

use log::debug;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::device::FtpDevice;
use crate::error::LinkError;
use crate::link::{Link, PeerIdentity, RestartParams};
use crate::protocol::{FtpPacket, Opcode};

/// Faults injected by a `LoopbackLink`. Request numbers are 1-based and
/// count every request sent, retransmissions included.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    lost_replies: BTreeSet<usize>,
    lost_from: Option<usize>,
    short_final_read: usize,
    silent: bool,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loses the reply to request number `n`.
    pub fn lose_reply(mut self, n: usize) -> Self {
        self.lost_replies.insert(n);
        self
    }

    /// Loses every reply from request number `n` on.
    pub fn lose_replies_from(mut self, n: usize) -> Self {
        self.lost_from = Some(n);
        self
    }

    /// Drops `bytes` from the end of the last chunk of every file read.
    pub fn short_final_read(mut self, bytes: usize) -> Self {
        self.short_final_read = bytes;
        self
    }

    /// The device never sends a heartbeat.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    fn loses(&self, n: usize) -> bool {
        self.lost_replies.contains(&n) || self.lost_from.is_some_and(|from| n >= from)
    }
}

pub struct LoopbackLink {
    device: FtpDevice,
    faults: FaultPlan,
    peer: PeerIdentity,
    requests: Vec<FtpPacket>,
    restarts: Vec<RestartParams>,
}

impl LoopbackLink {
    pub fn new(device: FtpDevice) -> Self {
        Self::with_faults(device, FaultPlan::default())
    }

    pub fn with_faults(device: FtpDevice, faults: FaultPlan) -> Self {
        Self {
            device,
            faults,
            peer: PeerIdentity {
                system_id: 1,
                component_id: 1,
            },
            requests: Vec::new(),
            restarts: Vec::new(),
        }
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> &[FtpPacket] {
        &self.requests
    }

    /// Requests sent so far with the given opcode.
    pub fn requests_for(&self, opcode: Opcode) -> Vec<&FtpPacket> {
        self.requests.iter().filter(|r| r.opcode == opcode).collect()
    }

    pub fn restarts(&self) -> &[RestartParams] {
        &self.restarts
    }

    pub fn device(&self) -> &FtpDevice {
        &self.device
    }
}

impl Link for LoopbackLink {
    fn max_payload(&self) -> usize {
        self.device.max_payload()
    }

    fn await_peer_handshake(&mut self, timeout: Duration) -> Result<PeerIdentity, LinkError> {
        if self.faults.silent {
            return Err(LinkError::HandshakeTimeout(timeout));
        }
        Ok(self.peer)
    }

    fn send_command(
        &mut self,
        request: &FtpPacket,
        _timeout: Duration,
    ) -> Result<FtpPacket, LinkError> {
        self.requests.push(request.clone());
        let n = self.requests.len();
        let mut reply = self.device.handle(request);

        if self.faults.loses(n) {
            debug!("Losing reply to request {} ({})", n, request.opcode);
            return Err(LinkError::Timeout);
        }

        let trim = self.faults.short_final_read;
        if trim > 0
            && request.opcode == Opcode::ReadFile
            && reply.opcode == Opcode::Ack
            && reply.data.len() < request.size
        {
            let keep = reply.data.len().saturating_sub(trim);
            debug!("Shortening final read at offset {} to {} bytes", request.offset, keep);
            reply.data.truncate(keep);
            reply.size = keep;
        }

        Ok(reply)
    }

    fn send_restart(&mut self, params: &RestartParams) -> Result<(), LinkError> {
        self.restarts.push(*params);
        Ok(())
    }
}
