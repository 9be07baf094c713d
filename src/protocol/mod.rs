//! MAVFTP protocol implementation
//!
//! Handles opcode and NAK tables, payload encoding, and directory listing
//! records.

pub mod commands;
pub mod listing;
pub mod packet;
pub mod responses;

pub use commands::Opcode;
pub use listing::{DirectoryEntry, ListingItem, encode_entry, parse_listing};
pub use packet::{FtpPacket, MAX_DATA_LEN, PAYLOAD_LEN};
pub use responses::NakCode;
