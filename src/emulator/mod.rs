//! Device emulator
//!
//! Serves a local directory as an autopilot filesystem over MAVLink/UDP so the
//! client can be exercised without hardware.

pub mod core;

pub use self::core::Emulator;
