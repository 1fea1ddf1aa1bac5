//! lbs-session firmware - nRF52840 LED Button peripheral.
//!
//! Brings up the SoftDevice and the GATT table, builds the one
//! [`SessionController`] and wires every event source into it:
//!
//! - SoftDevice / GATT events → `gatt::advertiser_task`
//! - GPIO edges → `buttons::button_task` (one per button)
//! - main loop → heartbeat LED only

#![no_std]
#![no_main]

mod buttons;
mod gatt;
mod leds;

use core::mem;

use defmt::{error, info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::gpio::AnyPin;
use embassy_nrf::interrupt::Priority;
use embassy_time::{Duration, Timer};
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use lbs_session::config::{
    SessionConfig, ATT_MTU, BUTTON_ADV_TOGGLE, BUTTON_DISCONNECT, BUTTON_REPORT, BUTTON_RESERVED,
    DEVICE_NAME, RUN_LED_BLINK_INTERVAL_MS,
};
use lbs_session::error::Error;
use lbs_session::session::SessionController;
use lbs_session::ui::Heartbeat;

use gatt::{PairingBridge, Server, SoftdeviceStack};
use leds::BoardLeds;

pub type Session = SessionController<SoftdeviceStack, BoardLeds>;

static SERVER: StaticCell<Server> = StaticCell::new();
static SESSION: StaticCell<Session> = StaticCell::new();
static PAIRING: StaticCell<PairingBridge> = StaticCell::new();

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: ATT_MTU }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr() as _,
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting {}", DEVICE_NAME);

    // GPIOTE and RTC must sit below the SoftDevice's reserved priorities.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(nrf_config);

    let leds = BoardLeds::new(
        AnyPin::from(p.P0_13),
        AnyPin::from(p.P0_14),
        AnyPin::from(p.P0_15),
    );

    let sd = Softdevice::enable(&softdevice_config());
    let server: &'static Server = match Server::new(sd) {
        Ok(server) => SERVER.init(server),
        Err(_) => {
            error!("GATT registration failed: {}", Error::ServiceInit);
            return;
        }
    };
    let sd: &'static Softdevice = sd;
    unwrap!(spawner.spawn(softdevice_task(sd)));
    info!("Bluetooth initialized");

    let session: &'static Session = match Session::new(
        SoftdeviceStack::new(server),
        leds,
        SessionConfig::default(),
    ) {
        Ok(session) => SESSION.init(session),
        Err(e) => {
            error!("Session setup failed: {}", e);
            return;
        }
    };

    // Seed the readable button value; nothing is subscribed yet.
    let _ = session.publish_button_state(false);

    let pairing: Option<&'static PairingBridge> = if session.security().is_enabled() {
        Some(PAIRING.init(PairingBridge::new(session)))
    } else {
        None
    };
    unwrap!(spawner.spawn(gatt::advertiser_task(sd, server, session, pairing)));

    let buttons = [
        (AnyPin::from(p.P0_11), BUTTON_REPORT),
        (AnyPin::from(p.P0_12), BUTTON_ADV_TOGGLE),
        (AnyPin::from(p.P0_24), BUTTON_DISCONNECT),
        (AnyPin::from(p.P0_25), BUTTON_RESERVED),
    ];
    for (pin, bit) in buttons {
        unwrap!(spawner.spawn(buttons::button_task(pin, bit, session)));
    }

    if let Err(e) = session.start() {
        error!("Startup aborted: {}", e);
        return;
    }

    let mut heartbeat = Heartbeat::new();
    loop {
        heartbeat.tick(session.indicators());
        Timer::after(Duration::from_millis(RUN_LED_BLINK_INTERVAL_MS)).await;
    }
}
