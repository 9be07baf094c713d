//! Transfer protocol driver
//!
//! Runs List, Put and Get against a `Session`. Each operation is a series of
//! exchanges; every exchange is retried on timeout up to the configured
//! attempt budget, while a NAK from the device fails the operation at once.

use log::{debug, info, warn};

use crate::config::TransferConfig;
use crate::link::{Link, Session};
use crate::protocol::{FtpPacket, ListingItem, NakCode, Opcode, parse_listing};
use crate::transfer::results::{
    Operation, TransferPayload, TransferRequest, TransferResult, TransferStatus,
};
use crate::transfer::state::{ExchangeEvent, ExchangeState};

pub struct TransferDriver {
    config: TransferConfig,
}

impl TransferDriver {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Runs one request to a terminal state.
    pub fn execute<L: Link>(
        &self,
        session: &mut Session<L>,
        request: TransferRequest,
    ) -> TransferResult {
        match request {
            TransferRequest::List { remote_path } => self.list(session, &remote_path),
            TransferRequest::Put {
                remote_path,
                payload,
            } => self.put(session, &payload, &remote_path),
            TransferRequest::Get { remote_path } => self.get(session, &remote_path),
        }
    }

    /// Lists the immediate children of `remote_path` ("" or "/" for root),
    /// in the order the device returns them.
    pub fn list<L: Link>(&self, session: &mut Session<L>, remote_path: &str) -> TransferResult {
        let path = if remote_path.is_empty() { "/" } else { remote_path };
        let mut entries = Vec::new();
        let mut offset: u32 = 0;

        loop {
            let request = session.stamp(
                FtpPacket::request(Opcode::ListDirectory)
                    .with_offset(offset)
                    .with_data(path.as_bytes().to_vec()),
            );
            let reply = match self.exchange(session, &request) {
                Ok(reply) => reply,
                Err(TransferStatus::Rejected {
                    error_code: NakCode::Eof,
                    ..
                }) => break,
                Err(status) => {
                    warn!("Listing {} failed: {}", path, status);
                    return TransferResult::failed(Operation::List, status);
                }
            };

            let items = parse_listing(&reply.data);
            if items.is_empty() {
                break;
            }
            offset += items.len() as u32;
            entries.extend(items.into_iter().filter_map(|item| match item {
                ListingItem::Entry(entry) => Some(entry),
                ListingItem::Skip => None,
            }));
        }

        info!("Listed {} - {} entries", path, entries.len());
        TransferResult::completed(Operation::List, Some(TransferPayload::Listing(entries)))
    }

    /// Writes `payload` to `remote_path`, creating or truncating it.
    pub fn put<L: Link>(
        &self,
        session: &mut Session<L>,
        payload: &[u8],
        remote_path: &str,
    ) -> TransferResult {
        let chunk_size = self.chunk_size(session);
        info!(
            "Uploading {} bytes to {} in chunks of {}",
            payload.len(),
            remote_path,
            chunk_size
        );

        let create = session.stamp(
            FtpPacket::request(Opcode::CreateFile).with_data(remote_path.as_bytes().to_vec()),
        );
        let remote_session = match self.exchange(session, &create) {
            Ok(reply) => reply.session,
            Err(status) => {
                warn!("Creating {} failed: {}", remote_path, status);
                return TransferResult::failed(Operation::Put, status);
            }
        };

        for (index, chunk) in payload.chunks(chunk_size).enumerate() {
            let Ok(offset) = u32::try_from(index * chunk_size) else {
                self.terminate(session, remote_session);
                return TransferResult::failed(
                    Operation::Put,
                    TransferStatus::LinkFault("file exceeds 4 GiB offset range".into()),
                );
            };
            let write = session.stamp(
                FtpPacket::request(Opcode::WriteFile)
                    .with_session(remote_session)
                    .with_offset(offset)
                    .with_data(chunk.to_vec()),
            );
            if let Err(status) = self.exchange(session, &write) {
                warn!("Write at offset {} of {} failed: {}", offset, remote_path, status);
                self.terminate(session, remote_session);
                return TransferResult::failed(Operation::Put, status);
            }
            debug!("Wrote {} bytes at offset {}", chunk.len(), offset);
        }

        self.terminate(session, remote_session);
        info!("Uploaded {} bytes to {}", payload.len(), remote_path);
        TransferResult::completed(Operation::Put, None)
    }

    /// Reads the whole of `remote_path` into memory.
    pub fn get<L: Link>(&self, session: &mut Session<L>, remote_path: &str) -> TransferResult {
        let chunk_size = self.chunk_size(session);

        let open = session.stamp(
            FtpPacket::request(Opcode::OpenFileRO).with_data(remote_path.as_bytes().to_vec()),
        );
        let (remote_session, reported_size) = match self.exchange(session, &open) {
            Ok(reply) => {
                let size = reply
                    .data
                    .get(..4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
                (reply.session, size)
            }
            Err(status) => {
                warn!("Opening {} failed: {}", remote_path, status);
                return TransferResult::failed(Operation::Get, status);
            }
        };

        let mut content = Vec::new();
        loop {
            let Ok(offset) = u32::try_from(content.len()) else {
                self.terminate(session, remote_session);
                return TransferResult::failed(
                    Operation::Get,
                    TransferStatus::LinkFault("file exceeds 4 GiB offset range".into()),
                );
            };
            let read = session.stamp(
                FtpPacket::request(Opcode::ReadFile)
                    .with_session(remote_session)
                    .with_offset(offset)
                    .with_size(chunk_size),
            );
            match self.exchange(session, &read) {
                Ok(reply) if reply.offset != offset => {
                    self.terminate(session, remote_session);
                    return TransferResult::failed(
                        Operation::Get,
                        TransferStatus::LinkFault(format!(
                            "read reply for offset {} while reading offset {}",
                            reply.offset, offset
                        )),
                    );
                }
                Ok(reply) => {
                    let received = reply.data.len();
                    content.extend_from_slice(&reply.data);
                    debug!("Read {} bytes at offset {}", received, offset);
                    if received < chunk_size {
                        break;
                    }
                }
                Err(TransferStatus::Rejected {
                    error_code: NakCode::Eof,
                    ..
                }) => break,
                Err(status) => {
                    warn!("Read at offset {} of {} failed: {}", offset, remote_path, status);
                    self.terminate(session, remote_session);
                    return TransferResult::failed(Operation::Get, status);
                }
            }
        }

        self.terminate(session, remote_session);
        if let Some(size) = reported_size {
            if size as usize != content.len() {
                warn!(
                    "{} reported {} bytes but {} were read",
                    remote_path,
                    size,
                    content.len()
                );
            }
        }
        info!("Downloaded {} bytes from {}", content.len(), remote_path);
        TransferResult::completed(Operation::Get, Some(TransferPayload::Content(content)))
    }

    fn chunk_size<L: Link>(&self, session: &Session<L>) -> usize {
        self.config.chunk_size.min(session.max_payload()).max(1)
    }

    /// Sends `request` until it is answered, rejected, or out of attempts.
    fn exchange<L: Link>(
        &self,
        session: &mut Session<L>,
        request: &FtpPacket,
    ) -> Result<FtpPacket, TransferStatus> {
        let max_attempts = self.config.max_attempts;
        let timeout = self.config.response_timeout();
        let mut state = ExchangeState::Idle;

        loop {
            state = state.next(ExchangeEvent::Transmit, max_attempts);
            let ExchangeState::AwaitingResponse { attempt } = state else {
                return Err(TransferStatus::Exhausted {
                    attempts: max_attempts,
                });
            };

            match session.send_command(request, timeout) {
                Ok(reply) if reply.opcode == Opcode::Ack && reply.req_opcode == request.opcode => {
                    state = state.next(ExchangeEvent::Reply, max_attempts);
                    debug!("{} seq {} {:?}", request.opcode, request.seq, state);
                    return Ok(reply);
                }
                Ok(reply) if reply.opcode == Opcode::Nack => {
                    state = state.next(ExchangeEvent::Rejected, max_attempts);
                    debug!("{} seq {} {:?}", request.opcode, request.seq, state);
                    let (error_code, system_error_code) =
                        reply.nak_detail().unwrap_or((NakCode::Fail, None));
                    return Err(TransferStatus::Rejected {
                        error_code,
                        system_error_code,
                    });
                }
                Ok(reply) => {
                    return Err(TransferStatus::LinkFault(format!(
                        "unexpected {} for {} reply to {}",
                        reply.opcode, reply.req_opcode, request.opcode
                    )));
                }
                Err(e) if e.is_timeout() => {
                    state = state.next(ExchangeEvent::Timeout, max_attempts);
                    warn!(
                        "{} seq {} timed out (attempt {}/{})",
                        request.opcode, request.seq, attempt, max_attempts
                    );
                }
                Err(e) => {
                    state = state.next(ExchangeEvent::LinkFault, max_attempts);
                    debug!("{} seq {} {:?}", request.opcode, request.seq, state);
                    return Err(TransferStatus::LinkFault(e.to_string()));
                }
            }
        }
    }

    /// Closes the remote session with a single attempt; failures are logged.
    fn terminate<L: Link>(&self, session: &mut Session<L>, remote_session: u8) {
        let request = session.stamp(
            FtpPacket::request(Opcode::TerminateSession).with_session(remote_session),
        );
        match session.send_command(&request, self.config.response_timeout()) {
            Ok(reply) if reply.opcode == Opcode::Ack => {}
            Ok(reply) => warn!(
                "Terminating session {} was refused: {:?}",
                remote_session,
                reply.nak_detail()
            ),
            Err(e) => warn!("Terminating session {} failed: {}", remote_session, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceStorage, FtpDevice};
    use crate::link::{FaultPlan, LoopbackLink};
    use crate::protocol::DirectoryEntry;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn driver(chunk_size: usize) -> TransferDriver {
        TransferDriver::new(TransferConfig {
            response_timeout_ms: 10,
            max_attempts: 3,
            chunk_size,
        })
    }

    fn session(dir: &TempDir, max_payload: usize, faults: FaultPlan) -> Session<LoopbackLink> {
        let device = FtpDevice::with_max_payload(DeviceStorage::new(dir.path()), max_payload);
        Session::establish(LoopbackLink::with_faults(device, faults), Duration::from_secs(1))
            .unwrap()
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn put_issues_create_then_ordered_chunks() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 512, FaultPlan::new());
        let payload = sample(5000);

        let result = driver(256).put(&mut session, &payload, "/a.bin");
        assert!(result.success());
        assert!(result.payload().is_none());

        let link = session.link();
        assert_eq!(link.requests()[0].opcode, Opcode::CreateFile);
        let writes = link.requests_for(Opcode::WriteFile);
        assert_eq!(writes.len(), 20);
        assert_eq!(link.requests_for(Opcode::CreateFile).len(), 1);
        for (i, write) in writes.iter().enumerate() {
            assert_eq!(write.offset as usize, i * 256);
        }
        assert_eq!(writes[19].data.len(), 5000 - 19 * 256);
        assert_eq!(fs::read(dir.path().join("a.bin")).unwrap(), payload);
    }

    #[test]
    fn chunks_are_capped_by_link_payload() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 100, FaultPlan::new());

        let result = driver(239).put(&mut session, &sample(250), "/a.bin");
        assert!(result.success());
        let writes = session.link().requests_for(Opcode::WriteFile);
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|w| w.data.len() <= 100));
    }

    #[test]
    fn lost_write_reply_is_retried_in_place() {
        let dir = TempDir::new().unwrap();
        // request 1 is CreateFile, request 4 is the third WriteFile
        let mut session = session(&dir, 239, FaultPlan::new().lose_reply(4));
        let payload = sample(1000);

        let result = driver(239).put(&mut session, &payload, "/lossy.bin");
        assert!(result.success());

        let writes = session.link().requests_for(Opcode::WriteFile);
        assert_eq!(writes.len(), 6);
        assert_eq!(writes[2], writes[3]);
        let offsets: Vec<u32> = writes.iter().map(|w| w.offset).collect();
        assert_eq!(offsets, vec![0, 239, 478, 478, 717, 956]);
        assert_eq!(fs::read(dir.path().join("lossy.bin")).unwrap(), payload);
    }

    #[test]
    fn exhausted_chunk_fails_put() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 239, FaultPlan::new().lose_replies_from(3));

        let result = driver(239).put(&mut session, &sample(1000), "/x.bin");
        assert!(!result.success());
        assert_eq!(result.status(), &TransferStatus::Exhausted { attempts: 3 });
        assert!(result.payload().is_none());
        // first write, then the second write three times
        assert_eq!(session.link().requests_for(Opcode::WriteFile).len(), 4);
    }

    #[test]
    fn get_reassembles_in_offset_order() {
        let dir = TempDir::new().unwrap();
        let payload = sample(1000);
        fs::write(dir.path().join("f.bin"), &payload).unwrap();
        let mut session = session(&dir, 239, FaultPlan::new().lose_reply(3));

        let result = driver(239).get(&mut session, "/f.bin");
        assert!(result.success());
        assert_eq!(result.content().unwrap(), payload.as_slice());
        assert_eq!(
            session.link().requests_for(Opcode::TerminateSession).len(),
            1
        );
    }

    #[test]
    fn get_of_exact_multiple_stops_on_eof() {
        let dir = TempDir::new().unwrap();
        let payload = sample(200);
        fs::write(dir.path().join("f.bin"), &payload).unwrap();
        let mut session = session(&dir, 100, FaultPlan::new());

        let result = driver(100).get(&mut session, "f.bin");
        assert_eq!(result.content().unwrap(), payload.as_slice());
        assert_eq!(session.link().requests_for(Opcode::ReadFile).len(), 3);
    }

    #[test]
    fn get_of_missing_file_is_rejected_without_retry() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 239, FaultPlan::new());

        let result = driver(239).get(&mut session, "/missing.bin");
        assert!(!result.success());
        assert_eq!(result.nak_code(), Some(NakCode::FailErrno));
        assert_eq!(result.system_error_code(), Some(2));
        assert!(result.content().is_none());
        assert_eq!(session.link().requests().len(), 1);
    }

    #[test]
    fn list_returns_entries_in_device_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.lua"), vec![0u8; 120]).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        let mut session = session(&dir, 239, FaultPlan::new());

        let result = driver(239).list(&mut session, "/");
        assert!(result.success());
        assert_eq!(
            result.entries().unwrap(),
            &[DirectoryEntry::file("a.lua", 120), DirectoryEntry::directory("b")]
        );
    }

    #[test]
    fn list_concatenates_pages() {
        let dir = TempDir::new().unwrap();
        for i in 0..12 {
            fs::write(dir.path().join(format!("file{:02}.lua", i)), b"x").unwrap();
        }
        // each "Ffile00.lua\t1\0" record is 14 bytes, so 3 per page
        let mut session = session(&dir, 45, FaultPlan::new());

        let result = driver(239).list(&mut session, "");
        let names: Vec<&str> = result
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        let expected: Vec<String> = (0..12).map(|i| format!("file{:02}.lua", i)).collect();
        assert_eq!(names, expected);
        assert_eq!(session.link().requests_for(Opcode::ListDirectory).len(), 5);
    }

    #[test]
    fn list_of_missing_path_fails_with_codes() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 239, FaultPlan::new());

        let result = driver(239).execute(
            &mut session,
            TransferRequest::List {
                remote_path: "/does/not/exist".into(),
            },
        );
        assert!(!result.success());
        assert!(result.error_code().unwrap() != 0);
        assert_eq!(result.system_error_code(), Some(2));
        assert!(result.payload().is_none());
        assert_eq!(session.link().requests().len(), 1);
    }
}
