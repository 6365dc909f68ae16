//! Host-testable library interface for the dispenser BLE peripheral.
//!
//! Re-exports the pure logic modules so the whole core can be tested
//! on the host (no embedded hardware required): configuration storage,
//! advertising payloads, the GATT registry, the GAP role machine, and
//! the event scheduler, all behind trait boundaries that the embedded
//! binary implements over the SoftDevice.
//!
//! Usage: `cargo test --lib`
//!
//! Note: The embedded binary uses main.rs with #![no_std] and #![no_main]
//! and is only built with `--features embedded`.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod adv;
pub mod config;
pub mod dispenser;
pub mod error;
pub mod gap;
pub mod gatt;
pub mod scheduler;
pub mod services;
pub mod store;

pub use error::{Error, RegistrationError};

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
