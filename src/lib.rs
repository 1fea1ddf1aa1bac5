//! Session controller for a BLE LED Button peripheral.
//!
//! Everything here is hardware-independent and runs on the host
//! (`cargo test`). The radio stack and the board are reached through the
//! [`ble::BleStack`] and [`ble::Indicators`] traits; the firmware binary
//! (`src/main.rs`, `embedded` feature) implements them on the nRF52840
//! SoftDevice.
//!
//! One [`session::SessionController`] owns all session state:
//!
//! - [`ble::registry`] - the single live connection handle
//! - [`ble::advertising`] - `Idle`/`Advertising` with confirmed transitions
//! - [`ble::notify`] - subscriptions and gated notifications
//! - [`ble::security`] - pairing lifecycle (or a no-op strategy)
//! - [`ble::remote`] - bounded intake of central writes
//! - [`ui`] - button dispatch, LED roles, heartbeat

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod ble;
pub mod config;
pub mod error;
pub mod session;
pub mod ui;

pub use error::{Error, ErrorKind};
pub use session::SessionController;
