//! GPIO button input with async debouncing.
//!
//! Four buttons (active-low with internal pull-up), one task each. A task
//! waits for an edge, debounces it, folds the new level into the shared
//! button state and hands `(state, changed)` to the session.

use core::sync::atomic::{AtomicU32, Ordering};

use defmt::debug;
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_time::{Duration, Timer};

use lbs_session::config::BUTTON_DEBOUNCE_MS;
use lbs_session::ui::ButtonMask;

use crate::Session;

/// Logical buttons currently held down.
static BUTTON_STATE: AtomicU32 = AtomicU32::new(0);

fn report(session: &Session, bit: u32, pressed: bool) {
    let state = if pressed {
        BUTTON_STATE.fetch_or(bit, Ordering::AcqRel) | bit
    } else {
        BUTTON_STATE.fetch_and(!bit, Ordering::AcqRel) & !bit
    };
    debug!("Buttons state {=u32:#b} changed {=u32:#b}", state, bit);
    session.on_buttons_changed(ButtonMask::new(state, bit));
}

#[embassy_executor::task(pool_size = 4)]
pub async fn button_task(pin: AnyPin, bit: u32, session: &'static Session) -> ! {
    let mut btn = Input::new(pin, Pull::Up);
    let debounce = Duration::from_millis(BUTTON_DEBOUNCE_MS);

    loop {
        btn.wait_for_falling_edge().await;
        Timer::after(debounce).await;
        if btn.is_high() {
            continue;
        }
        report(session, bit, true);

        btn.wait_for_rising_edge().await;
        Timer::after(debounce).await;
        report(session, bit, false);
    }
}
