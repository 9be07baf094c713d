pub mod cli;
pub mod config;
pub mod device;
pub mod emulator;
pub mod error;
pub mod link;
pub mod mavlink;
pub mod protocol;
pub mod transfer;
pub mod utils;
pub mod verify;

pub use link::Session;
pub use transfer::TransferDriver;
pub use verify::run_cycle;
