//! Board LEDs (nRF52840-DK LED1..LED3, active-low).

use core::cell::RefCell;

use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use lbs_session::ble::Indicators;
use lbs_session::ui::Led;

pub struct BoardLeds {
    pins: Mutex<CriticalSectionRawMutex, RefCell<[Output<'static>; 3]>>,
}

impl BoardLeds {
    /// All LEDs start off (pin high).
    pub fn new(run: AnyPin, connection: AnyPin, user: AnyPin) -> Self {
        let off = |pin: AnyPin| Output::new(pin, Level::High, OutputDrive::Standard);
        Self {
            pins: Mutex::new(RefCell::new([off(run), off(connection), off(user)])),
        }
    }
}

impl Indicators for BoardLeds {
    fn set(&self, led: Led, on: bool) {
        let index = match led {
            Led::Run => 0,
            Led::Connection => 1,
            Led::User => 2,
        };
        self.pins.lock(|pins| {
            let pin = &mut pins.borrow_mut()[index];
            if on {
                pin.set_low();
            } else {
                pin.set_high();
            }
        });
    }
}
