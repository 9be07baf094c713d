//! MAVFTP request handling
//!
//! `FtpDevice` answers file-transfer requests the way an autopilot does: one
//! open session at a time, chunked reads and writes at explicit offsets, and
//! replay of the previous reply when a request is retransmitted.

use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::device::storage::DeviceStorage;
use crate::error::StorageError;
use crate::protocol::responses::{EIO, ENOENT};
use crate::protocol::{FtpPacket, MAX_DATA_LEN, NakCode, Opcode, encode_entry};

const SESSION_ID: u8 = 0;
const ENOTDIR: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionMode {
    Read,
    Write,
}

struct OpenSession {
    file: File,
    mode: SessionMode,
    path: String,
}

/// Device-side MAVFTP state machine.
pub struct FtpDevice {
    storage: DeviceStorage,
    max_payload: usize,
    session: Option<OpenSession>,
    last_reply: Option<(FtpPacket, FtpPacket)>,
}

impl FtpDevice {
    pub fn new(storage: DeviceStorage) -> Self {
        Self::with_max_payload(storage, MAX_DATA_LEN)
    }

    /// Device accepting up to `max_payload` data bytes per request.
    pub fn with_max_payload(storage: DeviceStorage, max_payload: usize) -> Self {
        Self {
            storage,
            max_payload,
            session: None,
            last_reply: None,
        }
    }

    pub fn storage(&self) -> &DeviceStorage {
        &self.storage
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Closes any open session and forgets the last reply.
    pub fn reset_sessions(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Closing session on {}", session.path);
        }
        self.last_reply = None;
    }

    /// Handles one request and returns the reply to send.
    pub fn handle(&mut self, request: &FtpPacket) -> FtpPacket {
        if let Some((previous, reply)) = &self.last_reply {
            if previous == request {
                debug!("Retransmitted {} seq {}, replaying reply", request.opcode, request.seq);
                return reply.clone();
            }
        }

        let reply = self.dispatch(request);
        self.last_reply = Some((request.clone(), reply.clone()));
        reply
    }

    fn dispatch(&mut self, request: &FtpPacket) -> FtpPacket {
        match request.opcode {
            Opcode::TerminateSession => self.terminate_session(request),
            Opcode::ResetSessions => {
                self.reset_sessions();
                FtpPacket::ack(request)
            }
            Opcode::ListDirectory => self.list_directory(request),
            Opcode::OpenFileRO => self.open_read(request),
            Opcode::ReadFile => self.read_file(request),
            Opcode::CreateFile => self.create_file(request),
            Opcode::WriteFile => self.write_file(request),
            other => {
                warn!("Unsupported request {}", other);
                FtpPacket::nak(request, NakCode::UnknownCommand, None)
            }
        }
    }

    fn terminate_session(&mut self, request: &FtpPacket) -> FtpPacket {
        match &self.session {
            Some(session) if request.session == SESSION_ID => {
                info!("Session on {} terminated", session.path);
                self.session = None;
                FtpPacket::ack(request)
            }
            _ => FtpPacket::nak(request, NakCode::InvalidSession, None),
        }
    }

    fn list_directory(&mut self, request: &FtpPacket) -> FtpPacket {
        let path = request_path(request);
        let entries = match self.storage.list_directory(&path) {
            Ok(entries) => entries,
            Err(e) => return storage_nak(request, e),
        };

        let start = request.offset as usize;
        if start >= entries.len() {
            return FtpPacket::nak(request, NakCode::Eof, None);
        }

        let mut data = Vec::new();
        for entry in &entries[start..] {
            let record = encode_entry(entry);
            if data.len() + record.len() > self.max_payload {
                break;
            }
            data.extend(record);
        }
        if data.is_empty() {
            // a single record longer than the payload is reported as skipped
            data.extend_from_slice(b"S\0");
        }
        FtpPacket::ack(request).with_data(data)
    }

    fn open_read(&mut self, request: &FtpPacket) -> FtpPacket {
        let path = request_path(request);
        match self.storage.open_read(&path) {
            Ok((file, size)) => {
                self.replace_session(file, SessionMode::Read, path);
                let size = u32::try_from(size).unwrap_or(u32::MAX);
                FtpPacket::ack(request)
                    .with_session(SESSION_ID)
                    .with_data(size.to_le_bytes().to_vec())
            }
            Err(e) => storage_nak(request, e),
        }
    }

    fn create_file(&mut self, request: &FtpPacket) -> FtpPacket {
        let path = request_path(request);
        match self.storage.create_file(&path) {
            Ok(file) => {
                self.replace_session(file, SessionMode::Write, path);
                FtpPacket::ack(request).with_session(SESSION_ID)
            }
            Err(e) => storage_nak(request, e),
        }
    }

    fn read_file(&mut self, request: &FtpPacket) -> FtpPacket {
        let max_payload = self.max_payload;
        let Some(session) = self.session_for(request, SessionMode::Read) else {
            return FtpPacket::nak(request, NakCode::InvalidSession, None);
        };

        let wanted = match request.size {
            0 => max_payload,
            size => size.min(max_payload),
        };
        let mut chunk = vec![0u8; wanted];
        let result = session
            .file
            .seek(SeekFrom::Start(request.offset as u64))
            .and_then(|_| read_up_to(&mut session.file, &mut chunk));

        match result {
            Ok(0) => FtpPacket::nak(request, NakCode::Eof, None),
            Ok(n) => {
                chunk.truncate(n);
                debug!("Read {} bytes at offset {}", n, request.offset);
                FtpPacket::ack(request).with_data(chunk)
            }
            Err(e) => io_nak(request, &e),
        }
    }

    fn write_file(&mut self, request: &FtpPacket) -> FtpPacket {
        if request.data.len() > self.max_payload {
            return FtpPacket::nak(request, NakCode::InvalidDataSize, None);
        }
        let Some(session) = self.session_for(request, SessionMode::Write) else {
            return FtpPacket::nak(request, NakCode::InvalidSession, None);
        };

        let result = session
            .file
            .seek(SeekFrom::Start(request.offset as u64))
            .and_then(|_| session.file.write_all(&request.data))
            .and_then(|_| session.file.flush());

        match result {
            Ok(()) => {
                debug!("Wrote {} bytes at offset {}", request.data.len(), request.offset);
                FtpPacket::ack(request)
            }
            Err(e) => io_nak(request, &e),
        }
    }

    fn replace_session(&mut self, file: File, mode: SessionMode, path: String) {
        if let Some(previous) = self.session.take() {
            warn!("Replacing open session on {}", previous.path);
        }
        self.session = Some(OpenSession { file, mode, path });
    }

    fn session_for(&mut self, request: &FtpPacket, mode: SessionMode) -> Option<&mut OpenSession> {
        match self.session.as_mut() {
            Some(session) if request.session == SESSION_ID && session.mode == mode => Some(session),
            _ => None,
        }
    }
}

fn request_path(request: &FtpPacket) -> String {
    let raw = request.data.split(|b| *b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(raw).to_string()
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn io_nak(request: &FtpPacket, error: &io::Error) -> FtpPacket {
    let errno = match error.kind() {
        io::ErrorKind::NotFound => ENOENT,
        _ => error
            .raw_os_error()
            .and_then(|code| u8::try_from(code).ok())
            .unwrap_or(EIO),
    };
    FtpPacket::nak(request, NakCode::FailErrno, Some(errno))
}

fn storage_nak(request: &FtpPacket, error: StorageError) -> FtpPacket {
    warn!("{} failed: {}", request.opcode, error);
    match error {
        StorageError::IoError(e) => io_nak(request, &e),
        StorageError::NotADirectory(_) => FtpPacket::nak(request, NakCode::FailErrno, Some(ENOTDIR)),
        StorageError::InvalidPath(_) | StorageError::PathTraversal(_) => {
            FtpPacket::nak(request, NakCode::Fail, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn device(dir: &TempDir) -> FtpDevice {
        FtpDevice::new(DeviceStorage::new(dir.path()))
    }

    fn request(seq: u16, opcode: Opcode) -> FtpPacket {
        let mut packet = FtpPacket::request(opcode);
        packet.seq = seq;
        packet
    }

    #[test]
    fn write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let mut device = device(&dir);

        let create = device.handle(&request(0, Opcode::CreateFile).with_data(b"/f.bin".to_vec()));
        assert_eq!(create.opcode, Opcode::Ack);
        assert_eq!(create.seq, 1);

        let write = request(1, Opcode::WriteFile).with_data(b"hello".to_vec());
        assert_eq!(device.handle(&write).opcode, Opcode::Ack);
        device.handle(&request(2, Opcode::TerminateSession));
        assert_eq!(fs::read(dir.path().join("f.bin")).unwrap(), b"hello");

        let open = device.handle(&request(3, Opcode::OpenFileRO).with_data(b"/f.bin".to_vec()));
        assert_eq!(open.data, 5u32.to_le_bytes().to_vec());

        let read = device.handle(&request(4, Opcode::ReadFile).with_size(3));
        assert_eq!(read.data, b"hel");
        let read = device.handle(&request(5, Opcode::ReadFile).with_offset(3).with_size(3));
        assert_eq!(read.data, b"lo");
        let eof = device.handle(&request(6, Opcode::ReadFile).with_offset(5).with_size(3));
        assert_eq!(eof.nak_detail(), Some((NakCode::Eof, None)));
    }

    #[test]
    fn retransmission_replays_previous_reply() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f"), b"abc").unwrap();
        let mut device = device(&dir);

        let open = request(7, Opcode::OpenFileRO).with_data(b"f".to_vec());
        let first = device.handle(&open);
        fs::remove_file(dir.path().join("f")).unwrap();
        assert_eq!(device.handle(&open), first);
    }

    #[test]
    fn same_sequence_for_another_path_is_not_a_retransmission() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("APM")).unwrap();
        let mut device = device(&dir);

        let typo = device.handle(&request(0, Opcode::ListDirectory).with_data(b"/typo".to_vec()));
        assert_eq!(typo.nak_detail(), Some((NakCode::FailErrno, Some(ENOENT))));

        let listing = device.handle(&request(0, Opcode::ListDirectory).with_data(b"/APM".to_vec()));
        assert_eq!(listing.opcode, Opcode::Ack);
    }

    #[test]
    fn listing_is_paged_by_offset() {
        let dir = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        // room for two "Fx\t1\0" records
        let mut device = FtpDevice::with_max_payload(DeviceStorage::new(dir.path()), 10);

        let first = device.handle(&request(0, Opcode::ListDirectory).with_data(b"/".to_vec()));
        assert_eq!(first.data, b"Fa\t1\0Fb\t1\0");
        let second = device.handle(
            &request(1, Opcode::ListDirectory)
                .with_offset(2)
                .with_data(b"/".to_vec()),
        );
        assert_eq!(second.data, b"Fc\t1\0");
        let end = device.handle(
            &request(2, Opcode::ListDirectory)
                .with_offset(3)
                .with_data(b"/".to_vec()),
        );
        assert_eq!(end.nak_detail(), Some((NakCode::Eof, None)));
    }

    #[test]
    fn missing_directory_reports_errno() {
        let dir = TempDir::new().unwrap();
        let mut device = device(&dir);
        let reply = device.handle(&request(0, Opcode::ListDirectory).with_data(b"/nope".to_vec()));
        assert_eq!(reply.nak_detail(), Some((NakCode::FailErrno, Some(ENOENT))));
    }

    #[test]
    fn write_without_session_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut device = device(&dir);
        let reply = device.handle(&request(0, Opcode::WriteFile).with_data(b"x".to_vec()));
        assert_eq!(reply.nak_detail(), Some((NakCode::InvalidSession, None)));
    }
}
