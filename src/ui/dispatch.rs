//! Button snapshot → actions.
//!
//! `changed` is the trigger; `state` only tells the level. A held button
//! (bit set in `state`, clear in `changed`) yields nothing.
//!
//! - report button: both edges, carrying the new level
//! - advertise toggle / disconnect / reserved: press edge only

use heapless::Vec;

use super::{ButtonAction, ButtonMask};
use crate::config::{BUTTON_ADV_TOGGLE, BUTTON_DISCONNECT, BUTTON_REPORT, BUTTON_RESERVED};

/// Upper bound on actions from one snapshot (one per logical button).
pub const MAX_ACTIONS: usize = 4;

pub fn actions(mask: ButtonMask) -> Vec<ButtonAction, MAX_ACTIONS> {
    let mut out = Vec::new();

    if mask.changed & BUTTON_REPORT != 0 {
        let _ = out.push(ButtonAction::Report {
            pressed: mask.state & BUTTON_REPORT != 0,
        });
    }

    let pressed = mask.pressed();
    if pressed & BUTTON_ADV_TOGGLE != 0 {
        let _ = out.push(ButtonAction::ToggleAdvertising);
    }
    if pressed & BUTTON_DISCONNECT != 0 {
        let _ = out.push(ButtonAction::Disconnect);
    }
    if pressed & BUTTON_RESERVED != 0 {
        let _ = out.push(ButtonAction::Reserved);
    }

    out
}

/// 1-based number of the lowest logical button in `bits`.
pub fn button_number(bits: u32) -> Option<u8> {
    if bits == 0 {
        None
    } else {
        Some(bits.trailing_zeros() as u8 + 1)
    }
}
