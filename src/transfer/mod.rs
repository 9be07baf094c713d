//! Transfer module
//!
//! Drives List, Put and Get over an established session, with per-exchange
//! retry on timeout and immediate failure on device rejection.

pub mod driver;
pub mod results;
pub mod state;

// Re-export key types
pub use driver::TransferDriver;
pub use results::{Operation, TransferPayload, TransferRequest, TransferResult, TransferStatus};
pub use state::{ExchangeEvent, ExchangeState};
