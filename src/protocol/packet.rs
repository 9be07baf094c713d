//! MAVFTP payload codec
//!
//! Every file-transfer request and reply travels inside the 251-byte
//! `payload` field of a FILE_TRANSFER_PROTOCOL message, laid out as:
//!
//! | bytes  | field          |
//! |--------|----------------|
//! | 0..2   | seq (u16 LE)   |
//! | 2      | session        |
//! | 3      | opcode         |
//! | 4      | size           |
//! | 5      | req_opcode     |
//! | 6      | burst_complete |
//! | 7      | padding        |
//! | 8..12  | offset (u32 LE)|
//! | 12..   | data           |

use crate::error::PacketError;
use crate::protocol::commands::Opcode;
use crate::protocol::responses::NakCode;

pub const PAYLOAD_LEN: usize = 251;
pub const HEADER_LEN: usize = 12;
pub const MAX_DATA_LEN: usize = PAYLOAD_LEN - HEADER_LEN;

/// One MAVFTP request or reply.
///
/// `size` mirrors `data.len()` except on `ReadFile` requests, where it holds
/// the number of bytes asked for and `data` stays empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpPacket {
    pub seq: u16,
    pub session: u8,
    pub opcode: Opcode,
    pub size: usize,
    pub req_opcode: Opcode,
    pub burst_complete: bool,
    pub offset: u32,
    pub data: Vec<u8>,
}

impl FtpPacket {
    /// Creates a bare request for `opcode`.
    pub fn request(opcode: Opcode) -> Self {
        Self {
            seq: 0,
            session: 0,
            opcode,
            size: 0,
            req_opcode: Opcode::None,
            burst_complete: false,
            offset: 0,
            data: Vec::new(),
        }
    }

    pub fn with_session(mut self, session: u8) -> Self {
        self.session = session;
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Attaches `data` and sets `size` to its length.
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self.size = self.data.len();
        self
    }

    /// Sets the requested length without attaching data.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Builds the `Ack` answering `request`, echoing its session and offset.
    pub fn ack(request: &FtpPacket) -> Self {
        Self {
            seq: request.seq.wrapping_add(1),
            session: request.session,
            opcode: Opcode::Ack,
            size: 0,
            req_opcode: request.opcode,
            burst_complete: false,
            offset: request.offset,
            data: Vec::new(),
        }
    }

    /// Builds the `Nack` answering `request`.
    pub fn nak(request: &FtpPacket, code: NakCode, errno: Option<u8>) -> Self {
        let mut data = vec![code.as_u8()];
        if code == NakCode::FailErrno {
            data.push(errno.unwrap_or(0));
        }
        Self {
            opcode: Opcode::Nack,
            ..Self::ack(request)
        }
        .with_data(data)
    }

    /// The sequence number a reply to this request must carry.
    pub fn expected_reply_seq(&self) -> u16 {
        self.seq.wrapping_add(1)
    }

    /// Decodes the NAK error code and errno of a `Nack` reply.
    pub fn nak_detail(&self) -> Option<(NakCode, Option<u8>)> {
        if self.opcode != Opcode::Nack {
            return None;
        }
        let code = NakCode::from_u8(self.data.first().copied().unwrap_or(0));
        let errno = if code == NakCode::FailErrno {
            self.data.get(1).copied()
        } else {
            None
        };
        Some((code, errno))
    }

    /// Serialises into a full 251-byte payload.
    pub fn encode(&self) -> Result<[u8; PAYLOAD_LEN], PacketError> {
        if self.data.len() > MAX_DATA_LEN {
            return Err(PacketError::DataTooLong(self.data.len()));
        }
        let size = u8::try_from(self.size).map_err(|_| PacketError::DataTooLong(self.size))?;

        let mut out = [0u8; PAYLOAD_LEN];
        out[0..2].copy_from_slice(&self.seq.to_le_bytes());
        out[2] = self.session;
        out[3] = self.opcode.as_u8();
        out[4] = size;
        out[5] = self.req_opcode.as_u8();
        out[6] = u8::from(self.burst_complete);
        out[8..12].copy_from_slice(&self.offset.to_le_bytes());
        out[HEADER_LEN..HEADER_LEN + self.data.len()].copy_from_slice(&self.data);
        Ok(out)
    }

    /// Parses a payload. Trailing bytes beyond `size` are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_LEN {
            return Err(PacketError::TooShort(bytes.len()));
        }
        let opcode = Opcode::from_u8(bytes[3]).ok_or(PacketError::UnknownOpcode(bytes[3]))?;
        let req_opcode =
            Opcode::from_u8(bytes[5]).ok_or(PacketError::UnknownOpcode(bytes[5]))?;
        let size = bytes[4] as usize;
        if size > MAX_DATA_LEN {
            return Err(PacketError::DataTooLong(size));
        }
        let available = bytes.len() - HEADER_LEN;
        let data = bytes[HEADER_LEN..HEADER_LEN + size.min(available)].to_vec();

        Ok(Self {
            seq: u16::from_le_bytes([bytes[0], bytes[1]]),
            session: bytes[2],
            opcode,
            size,
            req_opcode,
            burst_complete: bytes[6] != 0,
            offset: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_request_layout() {
        let mut packet = FtpPacket::request(Opcode::WriteFile)
            .with_session(3)
            .with_offset(0x0102_0304)
            .with_data(b"abc".to_vec());
        packet.seq = 0x1234;

        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.len(), PAYLOAD_LEN);
        assert_eq!(&bytes[0..2], &[0x34, 0x12]);
        assert_eq!(bytes[2], 3);
        assert_eq!(bytes[3], 7);
        assert_eq!(bytes[4], 3);
        assert_eq!(&bytes[8..12], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[12..15], b"abc");
        assert!(bytes[15..].iter().all(|b| *b == 0));

        assert_eq!(FtpPacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn read_request_keeps_requested_size() {
        let packet = FtpPacket::request(Opcode::ReadFile).with_size(MAX_DATA_LEN);
        let bytes = packet.encode().unwrap();
        let decoded = FtpPacket::decode(&bytes).unwrap();
        assert_eq!(decoded.size, MAX_DATA_LEN);
    }

    #[test]
    fn oversized_data_is_rejected() {
        let packet = FtpPacket::request(Opcode::WriteFile).with_data(vec![0u8; MAX_DATA_LEN + 1]);
        assert!(matches!(packet.encode(), Err(PacketError::DataTooLong(240))));
    }

    #[test]
    fn short_or_unknown_payloads_fail_to_decode() {
        assert!(matches!(
            FtpPacket::decode(&[0u8; 5]),
            Err(PacketError::TooShort(5))
        ));
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[3] = 200;
        assert!(matches!(
            FtpPacket::decode(&bytes),
            Err(PacketError::UnknownOpcode(200))
        ));
    }

    #[test]
    fn nak_carries_errno_only_for_fail_errno() {
        let mut request = FtpPacket::request(Opcode::ListDirectory).with_data(b"/x".to_vec());
        request.seq = 9;

        let nak = FtpPacket::nak(&request, NakCode::FailErrno, Some(2));
        assert_eq!(nak.seq, 10);
        assert_eq!(nak.req_opcode, Opcode::ListDirectory);
        assert_eq!(nak.nak_detail(), Some((NakCode::FailErrno, Some(2))));

        let eof = FtpPacket::nak(&request, NakCode::Eof, Some(2));
        assert_eq!(eof.data, vec![6]);
        assert_eq!(eof.nak_detail(), Some((NakCode::Eof, None)));

        assert_eq!(FtpPacket::ack(&request).nak_detail(), None);
    }
}
