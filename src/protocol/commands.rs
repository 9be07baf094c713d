//! Module `commands`
//!
//! Defines the MAVFTP opcodes carried in the `opcode` and `req_opcode`
//! fields of every file-transfer payload.

use std::fmt;

/// A MAVFTP operation code.
///
/// Requests use the command variants; the device answers with `Ack` or
/// `Nack` and echoes the request opcode in `req_opcode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    None,
    TerminateSession,
    ResetSessions,
    ListDirectory,
    OpenFileRO,
    ReadFile,
    CreateFile,
    WriteFile,
    RemoveFile,
    CreateDirectory,
    OpenFileWO,
    Truncate,
    Rename,
    CalcFileCrc32,
    BurstReadFile,
    Ack,
    Nack,
}

impl Opcode {
    /// Returns the wire value of this opcode.
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::None => 0,
            Opcode::TerminateSession => 1,
            Opcode::ResetSessions => 2,
            Opcode::ListDirectory => 3,
            Opcode::OpenFileRO => 4,
            Opcode::ReadFile => 5,
            Opcode::CreateFile => 6,
            Opcode::WriteFile => 7,
            Opcode::RemoveFile => 8,
            Opcode::CreateDirectory => 9,
            Opcode::OpenFileWO => 10,
            Opcode::Truncate => 11,
            Opcode::Rename => 12,
            Opcode::CalcFileCrc32 => 13,
            Opcode::BurstReadFile => 14,
            Opcode::Ack => 128,
            Opcode::Nack => 129,
        }
    }

    /// Parses a wire value, returning `None` for unassigned codes.
    pub fn from_u8(value: u8) -> Option<Self> {
        let opcode = match value {
            0 => Opcode::None,
            1 => Opcode::TerminateSession,
            2 => Opcode::ResetSessions,
            3 => Opcode::ListDirectory,
            4 => Opcode::OpenFileRO,
            5 => Opcode::ReadFile,
            6 => Opcode::CreateFile,
            7 => Opcode::WriteFile,
            8 => Opcode::RemoveFile,
            9 => Opcode::CreateDirectory,
            10 => Opcode::OpenFileWO,
            11 => Opcode::Truncate,
            12 => Opcode::Rename,
            13 => Opcode::CalcFileCrc32,
            14 => Opcode::BurstReadFile,
            128 => Opcode::Ack,
            129 => Opcode::Nack,
            _ => return None,
        };
        Some(opcode)
    }

    /// Whether this opcode is a device reply rather than a request.
    pub fn is_reply(self) -> bool {
        matches!(self, Opcode::Ack | Opcode::Nack)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_map_back() {
        for value in 0..=u8::MAX {
            if let Some(opcode) = Opcode::from_u8(value) {
                assert_eq!(opcode.as_u8(), value);
            }
        }
        assert_eq!(Opcode::from_u8(15), None);
        assert_eq!(Opcode::from_u8(130), None);
    }

    #[test]
    fn only_ack_and_nack_are_replies() {
        assert!(Opcode::Ack.is_reply());
        assert!(Opcode::Nack.is_reply());
        assert!(!Opcode::ReadFile.is_reply());
    }
}
