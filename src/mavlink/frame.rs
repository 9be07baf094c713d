//! Module `frame`
//!
//! MAVLink frame encoding and stream decoding. Frames are always sent as
//! MAVLink 2 with trailing payload zeros truncated; both MAVLink 1 and 2
//! frames are accepted on receive. Frames with a bad checksum or an unknown
//! message id are dropped. A start marker whose header cannot belong to a
//! real frame is skipped as soon as the header is buffered.

use log::debug;

use crate::mavlink::messages::{Message, crc_extra, payload_len};

pub const STX_V1: u8 = 0xFE;
pub const STX_V2: u8 = 0xFD;

const V1_HEADER_LEN: usize = 6;
const V2_HEADER_LEN: usize = 10;
const CHECKSUM_LEN: usize = 2;
const SIGNATURE_LEN: usize = 13;
const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

/// Folds one byte into an X.25 (CRC-16/MCRF4XX) checksum.
pub fn crc_accumulate(crc: u16, byte: u8) -> u16 {
    let mut tmp = byte ^ (crc & 0xFF) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;
    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

pub fn x25_crc(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0xFFFF, |crc, b| crc_accumulate(crc, *b))
}

/// A decoded MAVLink frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub seq: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub message: Message,
}

/// Serialises messages as MAVLink 2 frames from one system/component.
pub struct FrameEncoder {
    system_id: u8,
    component_id: u8,
    seq: u8,
}

impl FrameEncoder {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
            seq: 0,
        }
    }

    pub fn encode(&mut self, message: &Message) -> Vec<u8> {
        let mut payload = message.encode_payload();
        while payload.len() > 1 && payload.last() == Some(&0) {
            payload.pop();
        }

        let id = message.id();
        let mut out = Vec::with_capacity(V2_HEADER_LEN + payload.len() + CHECKSUM_LEN);
        out.extend_from_slice(&[
            STX_V2,
            payload.len() as u8,
            0,
            0,
            self.seq,
            self.system_id,
            self.component_id,
            (id & 0xFF) as u8,
            ((id >> 8) & 0xFF) as u8,
            ((id >> 16) & 0xFF) as u8,
        ]);
        out.extend_from_slice(&payload);

        let mut crc = x25_crc(&out[1..]);
        if let Some(extra) = crc_extra(id) {
            crc = crc_accumulate(crc, extra);
        }
        out.extend_from_slice(&crc.to_le_bytes());

        self.seq = self.seq.wrapping_add(1);
        out
    }
}

enum Parse {
    Incomplete,
    Skip(usize),
    Frame(Frame, usize),
}

/// Reassembles frames from a byte stream or a sequence of datagrams.
#[derive(Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Whether bytes of an unfinished frame are buffered.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Gives up on the buffered partial frame's start marker; decoding
    /// resumes at the next marker.
    pub fn discard_stalled(&mut self) {
        if !self.buf.is_empty() {
            self.buf.drain(..1);
        }
    }

    /// Returns the next complete, valid frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let Some(start) = self.buf.iter().position(|b| *b == STX_V1 || *b == STX_V2) else {
                self.buf.clear();
                return None;
            };
            self.buf.drain(..start);

            match self.parse_head() {
                Parse::Incomplete => return None,
                Parse::Skip(n) => {
                    self.buf.drain(..n);
                }
                Parse::Frame(frame, n) => {
                    self.buf.drain(..n);
                    return Some(frame);
                }
            }
        }
    }

    fn parse_head(&self) -> Parse {
        let buf = &self.buf;
        let v2 = buf[0] == STX_V2;
        let header_len = if v2 { V2_HEADER_LEN } else { V1_HEADER_LEN };
        if buf.len() < header_len {
            return Parse::Incomplete;
        }

        let (seq, system_id, component_id, msg_id) = if v2 {
            (buf[4], buf[5], buf[6], u32::from_le_bytes([buf[7], buf[8], buf[9], 0]))
        } else {
            (buf[2], buf[3], buf[4], buf[5] as u32)
        };

        let body_len = buf[1] as usize;
        if v2 && buf[2] & !INCOMPAT_FLAG_SIGNED != 0 {
            return Parse::Skip(1);
        }
        if let Some(full_len) = payload_len(msg_id) {
            let plausible = if v2 {
                (1..=full_len).contains(&body_len)
            } else {
                body_len == full_len
            };
            if !plausible {
                return Parse::Skip(1);
            }
        }

        let signature_len = if v2 && buf[2] & INCOMPAT_FLAG_SIGNED != 0 {
            SIGNATURE_LEN
        } else {
            0
        };
        let body_end = header_len + body_len;
        let total = body_end + CHECKSUM_LEN + signature_len;
        if buf.len() < total {
            return Parse::Incomplete;
        }

        let Some(extra) = crc_extra(msg_id) else {
            return Parse::Skip(total);
        };
        let expected = crc_accumulate(x25_crc(&buf[1..body_end]), extra);
        let received = u16::from_le_bytes([buf[body_end], buf[body_end + 1]]);
        if expected != received {
            debug!(
                "Dropping message {} with bad checksum ({:#06x} != {:#06x})",
                msg_id, received, expected
            );
            return Parse::Skip(1);
        }

        match Message::decode(msg_id, &buf[header_len..body_end]) {
            Some(message) => Parse::Frame(
                Frame {
                    seq,
                    system_id,
                    component_id,
                    message,
                },
                total,
            ),
            None => Parse::Skip(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mavlink::messages::{CommandLong, FileTransferProtocol, Heartbeat};
    use crate::protocol::PAYLOAD_LEN;

    #[test]
    fn crc_matches_mcrf4xx_check_value() {
        assert_eq!(x25_crc(b"123456789"), 0x6F91);
    }

    #[test]
    fn heartbeat_round_trip() {
        let mut encoder = FrameEncoder::new(255, 190);
        let bytes = encoder.encode(&Message::Heartbeat(Heartbeat::gcs()));
        assert_eq!(bytes[0], STX_V2);

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.system_id, 255);
        assert_eq!(frame.component_id, 190);
        assert_eq!(frame.seq, 0);
        assert_eq!(frame.message, Message::Heartbeat(Heartbeat::gcs()));
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn trailing_zeros_are_truncated_and_restored() {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = 7;
        payload[12] = b'x';
        let message = Message::FileTransferProtocol(FileTransferProtocol {
            target_network: 0,
            target_system: 1,
            target_component: 1,
            payload,
        });

        let bytes = FrameEncoder::new(255, 190).encode(&message);
        // 3 target bytes + 13 payload bytes survive truncation
        assert_eq!(bytes[1], 16);

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        assert_eq!(decoder.next_frame().unwrap().message, message);
    }

    #[test]
    fn frames_split_across_pushes_and_noise_are_handled() {
        let mut encoder = FrameEncoder::new(1, 1);
        let command = Message::CommandLong(CommandLong {
            params: [1.0, 0.0, 0.0, 0.0, 0.0, 20190226.0, 0.0],
            command: 246,
            target_system: 1,
            target_component: 1,
            confirmation: 0,
        });
        let first = encoder.encode(&Message::Heartbeat(Heartbeat::autopilot()));
        let second = encoder.encode(&command);

        let mut stream = vec![0x00, 0x42];
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&second);

        let mut decoder = FrameDecoder::new();
        let (head, tail) = stream.split_at(first.len());
        decoder.push(head);
        assert!(decoder.next_frame().is_none());
        decoder.push(tail);

        assert!(matches!(
            decoder.next_frame().unwrap().message,
            Message::Heartbeat(_)
        ));
        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.seq, 1);
        assert_eq!(frame.message, command);
    }

    #[test]
    fn corrupted_frame_is_skipped() {
        let mut encoder = FrameEncoder::new(1, 1);
        let mut bad = encoder.encode(&Message::Heartbeat(Heartbeat::autopilot()));
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let good = encoder.encode(&Message::Heartbeat(Heartbeat::gcs()));

        let mut decoder = FrameDecoder::new();
        decoder.push(&bad);
        decoder.push(&good);
        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.seq, 1);
        assert_eq!(frame.message, Message::Heartbeat(Heartbeat::gcs()));
    }

    #[test]
    fn mavlink1_frames_are_accepted() {
        let payload = Message::Heartbeat(Heartbeat::autopilot()).encode_payload();
        let mut frame = vec![STX_V1, payload.len() as u8, 5, 1, 1, 0];
        frame.extend_from_slice(&payload);
        let crc = crc_accumulate(x25_crc(&frame[1..]), 50);
        frame.extend_from_slice(&crc.to_le_bytes());

        let mut decoder = FrameDecoder::new();
        decoder.push(&frame);
        let decoded = decoder.next_frame().unwrap();
        assert_eq!(decoded.seq, 5);
        assert_eq!(decoded.message, Message::Heartbeat(Heartbeat::autopilot()));
    }

    #[test]
    fn stray_start_markers_do_not_hold_back_frames() {
        let heartbeat = Message::Heartbeat(Heartbeat::autopilot());
        for stray in [STX_V1, STX_V2] {
            let mut decoder = FrameDecoder::new();
            decoder.push(&[stray]);
            decoder.push(&FrameEncoder::new(1, 1).encode(&heartbeat));
            assert_eq!(decoder.next_frame().unwrap().message, heartbeat);
            assert!(!decoder.has_partial());
        }
    }

    #[test]
    fn stalled_partial_frame_can_be_discarded() {
        // header of an unmodelled message announcing 200 payload bytes
        let mut decoder = FrameDecoder::new();
        decoder.push(&[STX_V2, 200, 0, 0, 0, 1, 1, 30, 0, 0, 0x11, 0x22]);
        assert!(decoder.next_frame().is_none());
        assert!(decoder.has_partial());

        decoder.discard_stalled();
        let heartbeat = Message::Heartbeat(Heartbeat::gcs());
        decoder.push(&FrameEncoder::new(255, 190).encode(&heartbeat));
        assert_eq!(decoder.next_frame().unwrap().message, heartbeat);
    }
}
