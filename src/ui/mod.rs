//! User interface subsystem - four buttons + three LEDs.
//!
//! ## Components
//!
//! - **Buttons**: debounced by the driver; the core only sees one
//!   `(state, changed)` snapshot per edge, turned into actions by
//!   [`dispatch`].
//! - **LEDs**: RUN (heartbeat), CONNECTION (link up), USER (driven by
//!   the central).

pub mod dispatch;

use crate::ble::Indicators;

/// Board LEDs by role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Led {
    /// Blinks while the main loop runs.
    Run,
    /// On while a central is connected.
    Connection,
    /// Written by the central through the LED characteristic.
    User,
}

/// One debounced edge: which logical buttons are down now, and which
/// changed since the previous snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonMask {
    pub state: u32,
    pub changed: u32,
}

impl ButtonMask {
    pub const fn new(state: u32, changed: u32) -> Self {
        Self { state, changed }
    }

    /// Press edges in this snapshot.
    pub const fn pressed(&self) -> u32 {
        self.changed & self.state
    }
}

/// What a button edge asks the session to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonAction {
    /// Publish the report button's new level.
    Report { pressed: bool },
    ToggleAdvertising,
    Disconnect,
    /// Reserved button pressed; nothing to do yet.
    Reserved,
}

/// RUN LED blinker driven by the main loop.
pub struct Heartbeat {
    ticks: u32,
}

impl Heartbeat {
    pub const fn new() -> Self {
        Self { ticks: 0 }
    }

    /// Flip the RUN LED; returns the new level.
    pub fn tick<I: Indicators>(&mut self, leds: &I) -> bool {
        self.ticks = self.ticks.wrapping_add(1);
        let on = self.ticks % 2 == 1;
        leds.set(Led::Run, on);
        on
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}
