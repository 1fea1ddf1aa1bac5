//! Bluetooth Low Energy subsystem.
//!
//! This module holds the peripheral-side session state for a single
//! central:
//!
//! 1. **Registry** - owns the one live connection handle.
//! 2. **Advertising** - `Idle`/`Advertising` with confirmed transitions.
//! 3. **Notify** - per-characteristic subscription flags and gated sends.
//! 4. **Security** - pairing lifecycle reporting (or a no-op strategy).
//! 5. **Remote** - bounded intake of central writes.
//!
//! The radio stack itself stays behind [`BleStack`]; the firmware binary
//! implements it on top of the SoftDevice, the tests with a recording mock.

pub mod adv_parser;
pub mod advertising;
pub mod notify;
pub mod registry;
pub mod remote;
pub mod security;

use crate::error::BleError;
use crate::ui::Led;

/// Bluetooth device address of the peer, as 6 little-endian bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeerAddr(pub [u8; 6]);

#[cfg(feature = "defmt")]
impl defmt::Format for PeerAddr {
    fn format(&self, f: defmt::Formatter) {
        let b = &self.0;
        defmt::write!(
            f,
            "{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}",
            b[5],
            b[4],
            b[3],
            b[2],
            b[1],
            b[0]
        )
    }
}

/// Reference to a live link.
///
/// Cloning acquires a reference, dropping releases it, so a clone taken
/// before a disconnect stays valid (the stack just refuses to send on it).
/// Equality is link identity.
pub trait LinkHandle: Clone + PartialEq {
    fn peer(&self) -> PeerAddr;
}

/// Notifiable characteristics the session publishes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Characteristic {
    /// Button state (read + notify).
    ButtonState,
    /// Response to a remote command (notify).
    CommandResponse,
}

impl Characteristic {
    pub const COUNT: usize = 2;

    pub const fn index(self) -> usize {
        match self {
            Characteristic::ButtonState => 0,
            Characteristic::CommandResponse => 1,
        }
    }
}

/// Calls the session makes into the radio stack.
///
/// Every call reports its outcome synchronously; nothing here blocks.
pub trait BleStack {
    type Conn: LinkHandle;

    /// Start connectable advertising with the given AD and scan response.
    fn start_advertising(&self, adv_data: &[u8], scan_data: &[u8]) -> Result<(), BleError>;

    fn stop_advertising(&self) -> Result<(), BleError>;

    fn disconnect(&self, conn: &Self::Conn, reason: u8) -> Result<(), BleError>;

    /// Queue a notification on `characteristic`.
    fn notify(
        &self,
        conn: &Self::Conn,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<(), BleError>;

    /// Update the stored (readable) value of `characteristic`.
    fn set_value(&self, _characteristic: Characteristic, _value: &[u8]) -> Result<(), BleError> {
        Ok(())
    }
}

/// Board LEDs.
pub trait Indicators {
    fn set(&self, led: Led, on: bool);
}

/// Security level reached by a link (GAP security mode 1 levels).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityLevel {
    /// No encryption.
    Open,
    /// Unauthenticated encryption.
    Encrypted,
    /// Authenticated (MITM-protected) encryption.
    Authenticated,
    /// LE Secure Connections.
    SecureConnections,
}

impl SecurityLevel {
    pub fn from_raw(level: u8) -> Self {
        match level {
            0 | 1 => SecurityLevel::Open,
            2 => SecurityLevel::Encrypted,
            3 => SecurityLevel::Authenticated,
            _ => SecurityLevel::SecureConnections,
        }
    }
}

/// Connection-lifecycle callbacks delivered by the radio stack.
pub trait ConnectionEvents {
    type Conn: LinkHandle;

    /// `result` carries the HCI error code of a failed connection attempt.
    fn on_connected(&self, conn: &Self::Conn, result: Result<(), u8>);

    fn on_disconnected(&self, conn: &Self::Conn, reason: u8);

    /// `result` carries the security error code when the level change failed.
    fn on_security_changed(&self, conn: &Self::Conn, level: SecurityLevel, result: Result<(), u8>);

    fn on_passkey_display(&self, conn: &Self::Conn, passkey: u32);

    fn on_pairing_cancel(&self, conn: &Self::Conn);

    fn on_pairing_complete(&self, conn: &Self::Conn, bonded: bool);

    fn on_pairing_failed(&self, conn: &Self::Conn, reason: u8);
}

/// Application-data callbacks delivered by the GATT service.
pub trait RemoteServiceEvents {
    type Conn: LinkHandle;

    /// CCCD write on `characteristic`.
    fn on_subscription_changed(&self, characteristic: Characteristic, enabled: bool);

    /// Write on the remote data characteristic. `data` is only valid for
    /// the duration of the call.
    fn on_data_received(&self, conn: &Self::Conn, data: &[u8]);

    /// Write on the LED control characteristic.
    fn led_cb(&self, on: bool);

    /// Read of the button characteristic.
    fn button_cb(&self) -> bool;
}
