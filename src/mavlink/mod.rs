//! MAVLink framing
//!
//! Minimal MAVLink support for carrying file-transfer payloads, heartbeats
//! and the restart command.

pub mod frame;
pub mod messages;

pub use frame::{Frame, FrameDecoder, FrameEncoder};
pub use messages::{CommandLong, FileTransferProtocol, Heartbeat, Message};
