//! Emulated device filesystem
//!
//! Serves MAVFTP requests from a local directory root. Used by the loopback
//! link in tests and by the UDP emulator.

pub mod handler;
pub mod storage;

pub use handler::FtpDevice;
pub use storage::DeviceStorage;
