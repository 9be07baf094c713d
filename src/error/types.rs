//! Error types
//!
//! Defines domain-specific error types for each layer of the client and the
//! device emulator.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::transfer::{Operation, TransferStatus};
use crate::verify::Digest;

/// MAVFTP payload codec errors
#[derive(Debug)]
pub enum PacketError {
    TooShort(usize),
    DataTooLong(usize),
    UnknownOpcode(u8),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::TooShort(len) => write!(f, "FTP payload too short: {} bytes", len),
            PacketError::DataTooLong(len) => write!(f, "FTP data too long: {} bytes", len),
            PacketError::UnknownOpcode(op) => write!(f, "Unknown FTP opcode: {}", op),
        }
    }
}

impl std::error::Error for PacketError {}

/// Link session errors
#[derive(Debug)]
pub enum LinkError {
    UnsupportedDescriptor(String),
    Connect(String, io::Error),
    HandshakeTimeout(Duration),
    /// No matching reply arrived within the attempt timeout.
    Timeout,
    PeerUnknown,
    Io(io::Error),
    Codec(PacketError),
}

impl LinkError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::UnsupportedDescriptor(d) => {
                write!(f, "Unsupported connection descriptor: {}", d)
            }
            LinkError::Connect(d, e) => write!(f, "Failed to open {}: {}", d, e),
            LinkError::HandshakeTimeout(t) => {
                write!(f, "No heartbeat from device within {:?}", t)
            }
            LinkError::Timeout => write!(f, "Timed out waiting for reply"),
            LinkError::PeerUnknown => write!(f, "Peer not identified yet"),
            LinkError::Io(e) => write!(f, "Link I/O error: {}", e),
            LinkError::Codec(e) => write!(f, "Malformed reply: {}", e),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<io::Error> for LinkError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => LinkError::Timeout,
            _ => LinkError::Io(error),
        }
    }
}

impl From<PacketError> for LinkError {
    fn from(error: PacketError) -> Self {
        LinkError::Codec(error)
    }
}

/// Device storage errors
#[derive(Debug)]
pub enum StorageError {
    InvalidPath(String),
    PathTraversal(String),
    NotADirectory(String),
    IoError(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidPath(p) => write!(f, "Invalid path: {}", p),
            StorageError::PathTraversal(p) => write!(f, "Path traversal attempt: {}", p),
            StorageError::NotADirectory(p) => write!(f, "Not a directory: {}", p),
            StorageError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(error: io::Error) -> Self {
        StorageError::IoError(error)
    }
}

/// Verification cycle errors
#[derive(Debug)]
pub enum CycleError {
    LocalIo { path: PathBuf, source: io::Error },
    Link(LinkError),
    Transfer {
        operation: Operation,
        remote_path: String,
        status: TransferStatus,
    },
    VerificationFailure {
        local: Digest,
        remote: Digest,
        local_len: usize,
        remote_len: usize,
    },
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::LocalIo { path, source } => {
                write!(f, "Cannot read {}: {}", path.display(), source)
            }
            CycleError::Link(e) => write!(f, "Link error: {}", e),
            CycleError::Transfer {
                operation,
                remote_path,
                status,
            } => write!(f, "{} {} failed: {}", operation, remote_path, status),
            CycleError::VerificationFailure {
                local,
                remote,
                local_len,
                remote_len,
            } => write!(
                f,
                "Verification failed: local {} ({} bytes) != remote {} ({} bytes)",
                local, local_len, remote, remote_len
            ),
        }
    }
}

impl std::error::Error for CycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CycleError::LocalIo { source, .. } => Some(source),
            CycleError::Link(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LinkError> for CycleError {
    fn from(error: LinkError) -> Self {
        CycleError::Link(error)
    }
}
