//! MAVLink messages used by the uploader
//!
//! Only the three messages the client and the emulator exchange are modelled.
//! Field order follows the MAVLink wire ordering (largest types first).

use crate::protocol::PAYLOAD_LEN;

pub const MSG_ID_HEARTBEAT: u32 = 0;
pub const MSG_ID_COMMAND_LONG: u32 = 76;
pub const MSG_ID_FILE_TRANSFER_PROTOCOL: u32 = 110;

pub const MAV_TYPE_GENERIC: u8 = 0;
pub const MAV_TYPE_GCS: u8 = 6;
pub const MAV_AUTOPILOT_ARDUPILOTMEGA: u8 = 3;
pub const MAV_AUTOPILOT_INVALID: u8 = 8;
pub const MAV_STATE_ACTIVE: u8 = 4;
pub const MAVLINK_VERSION: u8 = 3;

pub const MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN: u16 = 246;

const HEARTBEAT_LEN: usize = 9;
const COMMAND_LONG_LEN: usize = 33;
const FILE_TRANSFER_PROTOCOL_LEN: usize = 3 + PAYLOAD_LEN;

/// Untruncated payload length of a modelled message.
pub fn payload_len(msg_id: u32) -> Option<usize> {
    match msg_id {
        MSG_ID_HEARTBEAT => Some(HEARTBEAT_LEN),
        MSG_ID_COMMAND_LONG => Some(COMMAND_LONG_LEN),
        MSG_ID_FILE_TRANSFER_PROTOCOL => Some(FILE_TRANSFER_PROTOCOL_LEN),
        _ => None,
    }
}

/// Per-message seed folded into the frame checksum.
pub fn crc_extra(msg_id: u32) -> Option<u8> {
    match msg_id {
        MSG_ID_HEARTBEAT => Some(50),
        MSG_ID_COMMAND_LONG => Some(152),
        MSG_ID_FILE_TRANSFER_PROTOCOL => Some(84),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub custom_mode: u32,
    pub mav_type: u8,
    pub autopilot: u8,
    pub base_mode: u8,
    pub system_status: u8,
    pub mavlink_version: u8,
}

impl Heartbeat {
    /// Heartbeat announcing a ground control station.
    pub fn gcs() -> Self {
        Self {
            custom_mode: 0,
            mav_type: MAV_TYPE_GCS,
            autopilot: MAV_AUTOPILOT_INVALID,
            base_mode: 0,
            system_status: MAV_STATE_ACTIVE,
            mavlink_version: MAVLINK_VERSION,
        }
    }

    /// Heartbeat announcing an autopilot.
    pub fn autopilot() -> Self {
        Self {
            mav_type: MAV_TYPE_GENERIC,
            autopilot: MAV_AUTOPILOT_ARDUPILOTMEGA,
            ..Self::gcs()
        }
    }

    pub fn is_gcs(&self) -> bool {
        self.mav_type == MAV_TYPE_GCS
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandLong {
    pub params: [f32; 7],
    pub command: u16,
    pub target_system: u8,
    pub target_component: u8,
    pub confirmation: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileTransferProtocol {
    pub target_network: u8,
    pub target_system: u8,
    pub target_component: u8,
    pub payload: [u8; PAYLOAD_LEN],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Heartbeat(Heartbeat),
    CommandLong(CommandLong),
    FileTransferProtocol(FileTransferProtocol),
}

impl Message {
    pub fn id(&self) -> u32 {
        match self {
            Message::Heartbeat(_) => MSG_ID_HEARTBEAT,
            Message::CommandLong(_) => MSG_ID_COMMAND_LONG,
            Message::FileTransferProtocol(_) => MSG_ID_FILE_TRANSFER_PROTOCOL,
        }
    }

    /// Serialises the full, untruncated payload.
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Message::Heartbeat(hb) => {
                let mut out = Vec::with_capacity(HEARTBEAT_LEN);
                out.extend_from_slice(&hb.custom_mode.to_le_bytes());
                out.extend_from_slice(&[
                    hb.mav_type,
                    hb.autopilot,
                    hb.base_mode,
                    hb.system_status,
                    hb.mavlink_version,
                ]);
                out
            }
            Message::CommandLong(cmd) => {
                let mut out = Vec::with_capacity(COMMAND_LONG_LEN);
                for param in cmd.params {
                    out.extend_from_slice(&param.to_le_bytes());
                }
                out.extend_from_slice(&cmd.command.to_le_bytes());
                out.extend_from_slice(&[cmd.target_system, cmd.target_component, cmd.confirmation]);
                out
            }
            Message::FileTransferProtocol(ftp) => {
                let mut out = Vec::with_capacity(FILE_TRANSFER_PROTOCOL_LEN);
                out.extend_from_slice(&[ftp.target_network, ftp.target_system, ftp.target_component]);
                out.extend_from_slice(&ftp.payload);
                out
            }
        }
    }

    /// Parses a payload, zero-extending it when the sender truncated it.
    /// Returns `None` for message ids this crate does not model.
    pub fn decode(msg_id: u32, payload: &[u8]) -> Option<Self> {
        let full_len = payload_len(msg_id)?;
        let mut p = vec![0u8; full_len];
        let n = payload.len().min(full_len);
        p[..n].copy_from_slice(&payload[..n]);

        let message = match msg_id {
            MSG_ID_HEARTBEAT => Message::Heartbeat(Heartbeat {
                custom_mode: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
                mav_type: p[4],
                autopilot: p[5],
                base_mode: p[6],
                system_status: p[7],
                mavlink_version: p[8],
            }),
            MSG_ID_COMMAND_LONG => {
                let mut params = [0f32; 7];
                for (i, param) in params.iter_mut().enumerate() {
                    let at = i * 4;
                    *param = f32::from_le_bytes([p[at], p[at + 1], p[at + 2], p[at + 3]]);
                }
                Message::CommandLong(CommandLong {
                    params,
                    command: u16::from_le_bytes([p[28], p[29]]),
                    target_system: p[30],
                    target_component: p[31],
                    confirmation: p[32],
                })
            }
            _ => {
                let mut ftp_payload = [0u8; PAYLOAD_LEN];
                ftp_payload.copy_from_slice(&p[3..]);
                Message::FileTransferProtocol(FileTransferProtocol {
                    target_network: p[0],
                    target_system: p[1],
                    target_component: p[2],
                    payload: ftp_payload,
                })
            }
        };
        Some(message)
    }
}
