//! MAVFTP NAK handling
//!
//! Defines the error codes a device places in the first data byte of a
//! `Nack` reply.

use std::fmt;

/// Errno reported alongside `FailErrno` when a path does not exist.
pub const ENOENT: u8 = 2;
/// Generic I/O errno used when the host error carries no OS code.
pub const EIO: u8 = 5;

/// Error code carried by a `Nack` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NakCode {
    None,
    Fail,
    /// The second data byte holds a system errno.
    FailErrno,
    InvalidDataSize,
    InvalidSession,
    NoSessionsAvailable,
    /// End of file or end of a directory listing.
    Eof,
    UnknownCommand,
    FileExists,
    FileProtected,
    FileNotFound,
    Unknown(u8),
}

impl NakCode {
    pub fn as_u8(self) -> u8 {
        match self {
            NakCode::None => 0,
            NakCode::Fail => 1,
            NakCode::FailErrno => 2,
            NakCode::InvalidDataSize => 3,
            NakCode::InvalidSession => 4,
            NakCode::NoSessionsAvailable => 5,
            NakCode::Eof => 6,
            NakCode::UnknownCommand => 7,
            NakCode::FileExists => 8,
            NakCode::FileProtected => 9,
            NakCode::FileNotFound => 10,
            NakCode::Unknown(code) => code,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => NakCode::None,
            1 => NakCode::Fail,
            2 => NakCode::FailErrno,
            3 => NakCode::InvalidDataSize,
            4 => NakCode::InvalidSession,
            5 => NakCode::NoSessionsAvailable,
            6 => NakCode::Eof,
            7 => NakCode::UnknownCommand,
            8 => NakCode::FileExists,
            9 => NakCode::FileProtected,
            10 => NakCode::FileNotFound,
            other => NakCode::Unknown(other),
        }
    }
}

impl fmt::Display for NakCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NakCode::None => write!(f, "no error"),
            NakCode::Fail => write!(f, "unknown failure"),
            NakCode::FailErrno => write!(f, "command failed with system error"),
            NakCode::InvalidDataSize => write!(f, "invalid data size"),
            NakCode::InvalidSession => write!(f, "invalid session"),
            NakCode::NoSessionsAvailable => write!(f, "no sessions available"),
            NakCode::Eof => write!(f, "end of file"),
            NakCode::UnknownCommand => write!(f, "unknown command"),
            NakCode::FileExists => write!(f, "file exists"),
            NakCode::FileProtected => write!(f, "file protected"),
            NakCode::FileNotFound => write!(f, "file not found"),
            NakCode::Unknown(code) => write!(f, "unrecognised error code {}", code),
        }
    }
}
