//! Pairing lifecycle reporting.
//!
//! The stack does the cryptography; this side only tracks where the
//! current pairing stands and logs it. Nothing here tears a link down:
//! a failed pairing leaves the connection as it is.
//!
//! [`SecurityStrategy`] is picked once at construction, so the session
//! forwards every event unconditionally whether pairing is on or off.

use core::cell::Cell;
use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::String;

use super::PeerAddr;
pub use super::SecurityLevel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PairingState {
    Unauthenticated,
    PasskeyDisplayed,
    Bonded,
    Unbonded,
}

pub trait SecurityCallbacks {
    fn on_security_changed(&self, peer: &PeerAddr, level: SecurityLevel, result: Result<(), u8>);
    fn on_passkey_display(&self, peer: &PeerAddr, passkey: u32);
    fn on_pairing_cancel(&self, peer: &PeerAddr);
    fn on_pairing_complete(&self, peer: &PeerAddr, bonded: bool);
    fn on_pairing_failed(&self, peer: &PeerAddr, reason: u8);

    /// Link closed; the next link starts unauthenticated.
    fn reset(&self) {}

    fn state(&self) -> PairingState {
        PairingState::Unauthenticated
    }
}

/// Pairing enabled: tracks the state machine and logs every step.
pub struct PairingHandler {
    state: Mutex<CriticalSectionRawMutex, Cell<PairingState>>,
}

impl PairingHandler {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(PairingState::Unauthenticated)),
        }
    }

    fn set(&self, next: PairingState) {
        self.state.lock(|state| {
            let prev = state.replace(next);
            if prev != next {
                debug!("Pairing {} -> {}", prev, next);
            }
        });
    }
}

impl Default for PairingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityCallbacks for PairingHandler {
    fn on_security_changed(&self, peer: &PeerAddr, level: SecurityLevel, result: Result<(), u8>) {
        match result {
            Ok(()) => info!("Security changed: {} level {}", peer, level),
            Err(err) => warn!("Security failed: {} level {} err {}", peer, level, err),
        }
    }

    fn on_passkey_display(&self, peer: &PeerAddr, passkey: u32) {
        let mut digits: String<8> = String::new();
        let _ = write!(digits, "{:06}", passkey);
        info!("Passkey for {}: {}", peer, digits.as_str());
        self.set(PairingState::PasskeyDisplayed);
    }

    fn on_pairing_cancel(&self, peer: &PeerAddr) {
        info!("Pairing cancelled: {}", peer);
        self.set(PairingState::Unbonded);
    }

    fn on_pairing_complete(&self, peer: &PeerAddr, bonded: bool) {
        info!("Pairing completed: {}, bonded: {}", peer, bonded);
        self.set(if bonded {
            PairingState::Bonded
        } else {
            PairingState::Unbonded
        });
    }

    fn on_pairing_failed(&self, peer: &PeerAddr, reason: u8) {
        warn!("Pairing failed: {}, reason {}", peer, reason);
        self.set(PairingState::Unbonded);
    }

    fn reset(&self) {
        self.set(PairingState::Unauthenticated);
    }

    fn state(&self) -> PairingState {
        self.state.lock(|state| state.get())
    }
}

/// Pairing disabled: same signatures, nothing happens.
pub struct NoSecurity;

impl SecurityCallbacks for NoSecurity {
    fn on_security_changed(&self, _: &PeerAddr, _: SecurityLevel, _: Result<(), u8>) {}
    fn on_passkey_display(&self, _: &PeerAddr, _: u32) {}
    fn on_pairing_cancel(&self, _: &PeerAddr) {}
    fn on_pairing_complete(&self, _: &PeerAddr, _: bool) {}
    fn on_pairing_failed(&self, _: &PeerAddr, _: u8) {}
}

/// Security strategy chosen at construction time.
pub enum SecurityStrategy {
    Pairing(PairingHandler),
    Disabled(NoSecurity),
}

impl SecurityStrategy {
    pub const fn from_config(enabled: bool) -> Self {
        if enabled {
            SecurityStrategy::Pairing(PairingHandler::new())
        } else {
            SecurityStrategy::Disabled(NoSecurity)
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, SecurityStrategy::Pairing(_))
    }

    fn handler(&self) -> &dyn SecurityCallbacks {
        match self {
            SecurityStrategy::Pairing(handler) => handler,
            SecurityStrategy::Disabled(stub) => stub,
        }
    }
}

impl SecurityCallbacks for SecurityStrategy {
    fn on_security_changed(&self, peer: &PeerAddr, level: SecurityLevel, result: Result<(), u8>) {
        self.handler().on_security_changed(peer, level, result)
    }

    fn on_passkey_display(&self, peer: &PeerAddr, passkey: u32) {
        self.handler().on_passkey_display(peer, passkey)
    }

    fn on_pairing_cancel(&self, peer: &PeerAddr) {
        self.handler().on_pairing_cancel(peer)
    }

    fn on_pairing_complete(&self, peer: &PeerAddr, bonded: bool) {
        self.handler().on_pairing_complete(peer, bonded)
    }

    fn on_pairing_failed(&self, peer: &PeerAddr, reason: u8) {
        self.handler().on_pairing_failed(peer, reason)
    }

    fn reset(&self) {
        self.handler().reset()
    }

    fn state(&self) -> PairingState {
        self.handler().state()
    }
}
