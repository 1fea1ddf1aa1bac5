//! GATT table and SoftDevice glue.
//!
//! - `Server` - LED Button Service (button / LED / message / response).
//! - `SoftdeviceStack` - [`BleStack`] on top of the SoftDevice. Advertising
//!   runs in [`advertiser_task`]; start/stop requests reach it through
//!   [`ADV_COMMANDS`].
//! - `PairingBridge` - SoftDevice security handler forwarding pairing
//!   events to the session, with bonds kept in RAM.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{info, warn};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::Vec;
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{
    gatt_server, peripheral, Connection, EncryptionInfo, IdentityKey, MasterId, SecurityMode,
};
use nrf_softdevice::Softdevice;

use lbs_session::ble::advertising::MAX_ADV_DATA_LEN;
use lbs_session::ble::{
    BleStack, Characteristic, ConnectionEvents, LinkHandle, PeerAddr, RemoteServiceEvents,
    SecurityLevel,
};
use lbs_session::config::{
    ADV_INTERVAL, HCI_REMOTE_USER_TERMINATED_CONNECTION, REMOTE_DATA_MAX_LEN,
};
use lbs_session::error::BleError;

use crate::Session;

/// Bonds kept for the lifetime of the firmware run.
const MAX_BONDS: usize = 4;

/// nrf-softdevice does not hand the HCI reason to the GATT loop.
const DISCONNECT_REASON_UNREPORTED: u8 = 0;

#[nrf_softdevice::gatt_service(uuid = "00001523-1212-efde-1523-785feabcd123")]
pub struct LedButtonService {
    #[characteristic(uuid = "00001524-1212-efde-1523-785feabcd123", read, notify)]
    pub button: Vec<u8, 2>,
    #[characteristic(uuid = "00001525-1212-efde-1523-785feabcd123", write)]
    pub led: u8,
    #[characteristic(uuid = "00001526-1212-efde-1523-785feabcd123", write)]
    pub message: Vec<u8, REMOTE_DATA_MAX_LEN>,
    #[characteristic(uuid = "00001527-1212-efde-1523-785feabcd123", notify)]
    pub response: Vec<u8, REMOTE_DATA_MAX_LEN>,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub lbs: LedButtonService,
}

/// Live SoftDevice link, identified by the handle it got at connect time.
#[derive(Clone)]
pub struct Link {
    conn: Connection,
    handle: u16,
}

impl Link {
    /// `None` once the link is already gone.
    pub fn new(conn: Connection) -> Option<Self> {
        let handle = conn.handle()?;
        Some(Self { conn, handle })
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl LinkHandle for Link {
    fn peer(&self) -> PeerAddr {
        PeerAddr(self.conn.peer_address().bytes())
    }
}

/// Advertising data copied out of the session's payload.
pub struct AdvData {
    adv: Vec<u8, MAX_ADV_DATA_LEN>,
    scan: Vec<u8, MAX_ADV_DATA_LEN>,
}

pub enum AdvCommand {
    Start(AdvData),
    Stop,
}

pub static ADV_COMMANDS: Signal<CriticalSectionRawMutex, AdvCommand> = Signal::new();

/// Set while a central is connected; the single peripheral role is taken.
static LINK_ACTIVE: AtomicBool = AtomicBool::new(false);

pub struct SoftdeviceStack {
    server: &'static Server,
}

impl SoftdeviceStack {
    pub fn new(server: &'static Server) -> Self {
        Self { server }
    }
}

impl BleStack for SoftdeviceStack {
    type Conn = Link;

    fn start_advertising(&self, adv_data: &[u8], scan_data: &[u8]) -> Result<(), BleError> {
        if LINK_ACTIVE.load(Ordering::Acquire) {
            return Err(BleError::AdvertisingFailed);
        }
        let data = AdvData {
            adv: Vec::from_slice(adv_data).map_err(|_| BleError::AdvertisingFailed)?,
            scan: Vec::from_slice(scan_data).map_err(|_| BleError::AdvertisingFailed)?,
        };
        ADV_COMMANDS.signal(AdvCommand::Start(data));
        Ok(())
    }

    fn stop_advertising(&self) -> Result<(), BleError> {
        ADV_COMMANDS.signal(AdvCommand::Stop);
        Ok(())
    }

    /// `Connection::disconnect` always terminates with 0x13.
    fn disconnect(&self, conn: &Link, reason: u8) -> Result<(), BleError> {
        if reason != HCI_REMOTE_USER_TERMINATED_CONNECTION {
            warn!("Disconnect reason {=u8:#x} not supported, sending 0x13", reason);
        }
        conn.conn.disconnect().map_err(|_| BleError::DisconnectFailed)
    }

    fn notify(
        &self,
        conn: &Link,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<(), BleError> {
        match characteristic {
            Characteristic::ButtonState => {
                let value = Vec::from_slice(value).map_err(|_| BleError::NotifyFailed)?;
                self.server
                    .lbs
                    .button_notify(&conn.conn, &value)
                    .map_err(|_| BleError::NotifyFailed)
            }
            Characteristic::CommandResponse => {
                let value = Vec::from_slice(value).map_err(|_| BleError::NotifyFailed)?;
                self.server
                    .lbs
                    .response_notify(&conn.conn, &value)
                    .map_err(|_| BleError::NotifyFailed)
            }
        }
    }

    fn set_value(&self, characteristic: Characteristic, value: &[u8]) -> Result<(), BleError> {
        match characteristic {
            Characteristic::ButtonState => {
                let value = Vec::from_slice(value).map_err(|_| BleError::NotifyFailed)?;
                self.server
                    .lbs
                    .button_set(&value)
                    .map_err(|_| BleError::NotifyFailed)
            }
            Characteristic::CommandResponse => Ok(()),
        }
    }
}

struct Bond {
    master_id: MasterId,
    key: EncryptionInfo,
    peer_id: IdentityKey,
}

pub struct PairingBridge {
    session: &'static Session,
    bonds: RefCell<Vec<Bond, MAX_BONDS>>,
}

impl PairingBridge {
    pub fn new(session: &'static Session) -> Self {
        Self {
            session,
            bonds: RefCell::new(Vec::new()),
        }
    }
}

fn security_level(mode: SecurityMode) -> SecurityLevel {
    match mode {
        SecurityMode::NoAccess | SecurityMode::Open => SecurityLevel::Open,
        SecurityMode::Mitm | SecurityMode::SignedMitm => SecurityLevel::Authenticated,
        SecurityMode::LescMitm => SecurityLevel::SecureConnections,
        _ => SecurityLevel::Encrypted,
    }
}

impl SecurityHandler for PairingBridge {
    fn io_capabilities(&self) -> IoCapabilities {
        IoCapabilities::DisplayOnly
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        true
    }

    fn display_passkey(&self, passkey: &[u8; 6]) {
        let value = passkey
            .iter()
            .fold(0u32, |acc, d| acc * 10 + u32::from(d.wrapping_sub(b'0')));
        if let Some(link) = self.session.registry().current() {
            self.session.on_passkey_display(&link, value);
        } else {
            info!("Passkey {} with no registered link", value);
        }
    }

    fn on_security_update(&self, conn: &Connection, mode: SecurityMode) {
        if let Some(link) = Link::new(conn.clone()) {
            self.session
                .on_security_changed(&link, security_level(mode), Ok(()));
        }
    }

    fn on_bonded(
        &self,
        conn: &Connection,
        master_id: MasterId,
        key: EncryptionInfo,
        peer_id: IdentityKey,
    ) {
        {
            let mut bonds = self.bonds.borrow_mut();
            if let Some(existing) = bonds.iter_mut().find(|b| b.master_id == master_id) {
                existing.key = key;
                existing.peer_id = peer_id;
            } else {
                if bonds.is_full() {
                    bonds.remove(0);
                }
                let _ = bonds.push(Bond {
                    master_id,
                    key,
                    peer_id,
                });
            }
        }

        if let Some(link) = Link::new(conn.clone()) {
            self.session.on_pairing_complete(&link, true);
        }
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        self.bonds
            .borrow()
            .iter()
            .find_map(|b| (b.master_id == master_id).then_some(b.key))
    }
}

async fn advertise(
    sd: &'static Softdevice,
    data: &AdvData,
    pairing: Option<&'static PairingBridge>,
) -> Result<Connection, peripheral::AdvertiseError> {
    let config = peripheral::Config {
        interval: ADV_INTERVAL,
        ..Default::default()
    };
    let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
        adv_data: data.adv.as_slice(),
        scan_data: data.scan.as_slice(),
    };
    match pairing {
        Some(handler) => peripheral::advertise_pairable(sd, adv, &config, handler).await,
        None => peripheral::advertise_connectable(sd, adv, &config).await,
    }
}

/// Runs one connection: registers it, pumps GATT events into the session
/// until the link drops, then reports the disconnect.
async fn serve(conn: Connection, server: &'static Server, session: &'static Session) {
    let Some(link) = Link::new(conn) else {
        warn!("Link dropped before registration");
        return;
    };

    LINK_ACTIVE.store(true, Ordering::Release);
    session.on_connected(&link, Ok(()));

    let err = gatt_server::run(&link.conn, server, |e| match e {
        ServerEvent::Lbs(e) => match e {
            LedButtonServiceEvent::ButtonCccdWrite { notifications } => {
                session.on_subscription_changed(Characteristic::ButtonState, notifications)
            }
            LedButtonServiceEvent::ResponseCccdWrite { notifications } => {
                session.on_subscription_changed(Characteristic::CommandResponse, notifications)
            }
            LedButtonServiceEvent::LedWrite(value) => session.led_cb(value != 0),
            LedButtonServiceEvent::MessageWrite(data) => session.on_data_received(&link, &data),
        },
    })
    .await;
    info!("GATT server stopped: {:?}", err);

    LINK_ACTIVE.store(false, Ordering::Release);
    session.on_disconnected(&link, DISCONNECT_REASON_UNREPORTED);
}

/// Owns the SoftDevice advertising set. Waits for a start request,
/// advertises until a central connects or a stop request arrives, and
/// serves the resulting connection.
#[embassy_executor::task]
pub async fn advertiser_task(
    sd: &'static Softdevice,
    server: &'static Server,
    session: &'static Session,
    pairing: Option<&'static PairingBridge>,
) -> ! {
    let mut pending: Option<AdvCommand> = None;

    loop {
        let command = match pending.take() {
            Some(command) => command,
            None => ADV_COMMANDS.wait().await,
        };
        let AdvCommand::Start(data) = command else {
            continue;
        };

        match select(advertise(sd, &data, pairing), ADV_COMMANDS.wait()).await {
            Either::First(Ok(conn)) => serve(conn, server, session).await,
            Either::First(Err(e)) => {
                warn!("Advertising ended without a connection: {:?}", e);
                session.advertising().on_advertising_ended();
            }
            // Dropping the advertise future stops the SoftDevice advertiser.
            Either::Second(next) => pending = Some(next),
        }
    }
}
