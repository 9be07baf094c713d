//! Verification module
//!
//! Upload, read back and digest comparison of one local file.

pub mod cycle;
pub mod digest;

pub use cycle::{CycleOptions, CycleReport, run_cycle};
pub use digest::{Digest, digest};
