//! Advertising controller.
//!
//! Tracks `Idle`/`Advertising` and only moves after the stack confirms a
//! start or stop. The check, the stack call and the commit run inside one
//! critical section, so two racing toggles can't both start advertising.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use super::adv_parser::{
    AD_TYPE_FLAGS, AD_TYPE_NAME_COMPLETE, AD_TYPE_UUID128_COMPLETE, FLAG_BR_EDR_NOT_SUPPORTED,
    FLAG_LE_GENERAL_DISCOVERABLE,
};
use super::BleStack;
use crate::error::Error;

/// Legacy advertising PDU payload limit.
pub const MAX_ADV_DATA_LEN: usize = 31;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingState {
    Idle,
    Advertising,
}

/// Fixed advertising + scan response data.
///
/// AD: flags (general discoverable, BR/EDR not supported) and the
/// complete local name. Scan response: the complete list holding the one
/// 128-bit service UUID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertisingPayload {
    adv_data: Vec<u8, MAX_ADV_DATA_LEN>,
    scan_data: Vec<u8, MAX_ADV_DATA_LEN>,
}

impl AdvertisingPayload {
    pub fn new(device_name: &str, service_uuid: u128) -> Result<Self, Error> {
        let mut adv_data = Vec::new();
        push_record(
            &mut adv_data,
            AD_TYPE_FLAGS,
            &[FLAG_LE_GENERAL_DISCOVERABLE | FLAG_BR_EDR_NOT_SUPPORTED],
        )?;
        push_record(&mut adv_data, AD_TYPE_NAME_COMPLETE, device_name.as_bytes())?;

        let mut scan_data = Vec::new();
        push_record(
            &mut scan_data,
            AD_TYPE_UUID128_COMPLETE,
            &service_uuid.to_le_bytes(),
        )?;

        Ok(Self {
            adv_data,
            scan_data,
        })
    }

    pub fn adv_data(&self) -> &[u8] {
        &self.adv_data
    }

    pub fn scan_data(&self) -> &[u8] {
        &self.scan_data
    }
}

fn push_record(buf: &mut Vec<u8, MAX_ADV_DATA_LEN>, ad_type: u8, body: &[u8]) -> Result<(), Error> {
    let len = u8::try_from(body.len() + 1).map_err(|_| Error::AdvertisingDataTooLong)?;
    buf.push(len).map_err(|_| Error::AdvertisingDataTooLong)?;
    buf.push(ad_type).map_err(|_| Error::AdvertisingDataTooLong)?;
    buf.extend_from_slice(body)
        .map_err(|_| Error::AdvertisingDataTooLong)
}

pub struct AdvertisingController {
    state: Mutex<CriticalSectionRawMutex, Cell<AdvertisingState>>,
    payload: AdvertisingPayload,
}

impl AdvertisingController {
    pub fn new(payload: AdvertisingPayload) -> Self {
        Self {
            state: Mutex::new(Cell::new(AdvertisingState::Idle)),
            payload,
        }
    }

    pub fn state(&self) -> AdvertisingState {
        self.state.lock(|state| state.get())
    }

    pub fn is_advertising(&self) -> bool {
        self.state() == AdvertisingState::Advertising
    }

    pub fn payload(&self) -> &AdvertisingPayload {
        &self.payload
    }

    /// Start if idle, stop if advertising. Returns the state after the
    /// attempt; on failure the state is left as it was.
    pub fn toggle<S: BleStack>(&self, stack: &S) -> Result<AdvertisingState, Error> {
        self.state.lock(|state| match state.get() {
            AdvertisingState::Idle => self.start_locked(state, stack),
            AdvertisingState::Advertising => self.stop_locked(state, stack),
        })
    }

    /// Start advertising. Refused without a stack call when already
    /// advertising.
    pub fn start<S: BleStack>(&self, stack: &S) -> Result<AdvertisingState, Error> {
        self.state.lock(|state| match state.get() {
            AdvertisingState::Idle => self.start_locked(state, stack),
            AdvertisingState::Advertising => {
                warn!("Advertising already active");
                Err(Error::AdvertisingAlreadyActive)
            }
        })
    }

    /// Stop advertising. Refused without a stack call when idle.
    pub fn stop<S: BleStack>(&self, stack: &S) -> Result<AdvertisingState, Error> {
        self.state.lock(|state| match state.get() {
            AdvertisingState::Advertising => self.stop_locked(state, stack),
            AdvertisingState::Idle => {
                warn!("Advertising not active");
                Err(Error::AdvertisingNotActive)
            }
        })
    }

    /// A central connected: the stack ends connectable advertising on its
    /// own, which counts as a confirmed stop.
    pub fn on_link_established(&self) {
        self.state.lock(|state| {
            if state.replace(AdvertisingState::Idle) == AdvertisingState::Advertising {
                debug!("Advertising ended by connection");
            }
        })
    }

    /// The stack reports advertising over without a connection (failed to
    /// go on air, or timed out). Confirmed stop.
    pub fn on_advertising_ended(&self) {
        self.state.lock(|state| {
            if state.replace(AdvertisingState::Idle) == AdvertisingState::Advertising {
                warn!("Advertising ended without a connection");
            }
        })
    }

    fn start_locked<S: BleStack>(
        &self,
        state: &Cell<AdvertisingState>,
        stack: &S,
    ) -> Result<AdvertisingState, Error> {
        match stack.start_advertising(self.payload.adv_data(), self.payload.scan_data()) {
            Ok(()) => {
                info!("Advertising started");
                state.set(AdvertisingState::Advertising);
                Ok(AdvertisingState::Advertising)
            }
            Err(e) => {
                error!("Failed to start advertising (err {})", e);
                Err(Error::Ble(e))
            }
        }
    }

    fn stop_locked<S: BleStack>(
        &self,
        state: &Cell<AdvertisingState>,
        stack: &S,
    ) -> Result<AdvertisingState, Error> {
        match stack.stop_advertising() {
            Ok(()) => {
                info!("Advertising stopped");
                state.set(AdvertisingState::Idle);
                Ok(AdvertisingState::Idle)
            }
            Err(e) => {
                error!("Failed to stop advertising (err {})", e);
                Err(Error::Ble(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::adv_parser::{contains_service_uuid128, extract_device_name, extract_flags};
    use crate::ble::{Characteristic, LinkHandle, PeerAddr};
    use crate::error::BleError;
    use core::cell::RefCell;

    const UUID: u128 = 0x00001523_1212_efde_1523_785feabcd123;

    #[derive(Clone, PartialEq)]
    struct NoLink;

    impl LinkHandle for NoLink {
        fn peer(&self) -> PeerAddr {
            PeerAddr::default()
        }
    }

    /// Stack whose next advertising results are scripted.
    #[derive(Default)]
    struct ScriptedStack {
        results: RefCell<std::vec::Vec<Result<(), BleError>>>,
        starts: Cell<usize>,
        stops: Cell<usize>,
    }

    impl ScriptedStack {
        fn next(&self) -> Result<(), BleError> {
            let mut results = self.results.borrow_mut();
            if results.is_empty() {
                Ok(())
            } else {
                results.remove(0)
            }
        }
    }

    impl BleStack for ScriptedStack {
        type Conn = NoLink;

        fn start_advertising(&self, _adv: &[u8], _scan: &[u8]) -> Result<(), BleError> {
            self.starts.set(self.starts.get() + 1);
            self.next()
        }

        fn stop_advertising(&self) -> Result<(), BleError> {
            self.stops.set(self.stops.get() + 1);
            self.next()
        }

        fn disconnect(&self, _conn: &NoLink, _reason: u8) -> Result<(), BleError> {
            Ok(())
        }

        fn notify(&self, _: &NoLink, _: Characteristic, _: &[u8]) -> Result<(), BleError> {
            Ok(())
        }
    }

    fn controller() -> AdvertisingController {
        AdvertisingController::new(AdvertisingPayload::new("Nordic_LBS", UUID).unwrap())
    }

    #[test]
    fn payload_carries_flags_name_and_uuid() {
        let payload = AdvertisingPayload::new("Nordic_LBS", UUID).unwrap();

        assert_eq!(extract_flags(payload.adv_data()), Some(0x06));
        assert_eq!(extract_device_name(payload.adv_data()).as_str(), "Nordic_LBS");
        assert!(contains_service_uuid128(payload.scan_data(), UUID));
        assert_eq!(payload.scan_data().len(), 18);
    }

    #[test]
    fn payload_rejects_name_over_pdu_limit() {
        // 3 bytes of flags + 2 bytes of header leave 26 for the name.
        assert!(AdvertisingPayload::new("ABCDEFGHIJKLMNOPQRSTUVWXYZ", UUID).is_ok());
        assert_eq!(
            AdvertisingPayload::new("ABCDEFGHIJKLMNOPQRSTUVWXYZ0", UUID),
            Err(Error::AdvertisingDataTooLong)
        );
    }

    #[test]
    fn toggle_alternates_on_success() {
        let adv = controller();
        let stack = ScriptedStack::default();

        assert_eq!(adv.toggle(&stack), Ok(AdvertisingState::Advertising));
        assert_eq!(adv.toggle(&stack), Ok(AdvertisingState::Idle));
        assert_eq!(stack.starts.get(), 1);
        assert_eq!(stack.stops.get(), 1);
    }

    #[test]
    fn failed_start_stays_idle_and_retry_works() {
        let adv = controller();
        let stack = ScriptedStack::default();
        stack.results.borrow_mut().push(Err(BleError::Raw(0x12)));

        assert_eq!(adv.toggle(&stack), Err(Error::Ble(BleError::Raw(0x12))));
        assert_eq!(adv.state(), AdvertisingState::Idle);

        assert_eq!(adv.toggle(&stack), Ok(AdvertisingState::Advertising));
    }

    #[test]
    fn failed_stop_stays_advertising() {
        let adv = controller();
        let stack = ScriptedStack::default();
        adv.toggle(&stack).unwrap();
        stack.results.borrow_mut().push(Err(BleError::AdvertisingFailed));

        assert!(adv.toggle(&stack).is_err());
        assert_eq!(adv.state(), AdvertisingState::Advertising);
    }

    #[test]
    fn double_start_and_double_stop_are_refused() {
        let adv = controller();
        let stack = ScriptedStack::default();

        assert_eq!(adv.stop(&stack), Err(Error::AdvertisingNotActive));
        adv.start(&stack).unwrap();
        assert_eq!(adv.start(&stack), Err(Error::AdvertisingAlreadyActive));
        assert_eq!(stack.starts.get(), 1);
        assert_eq!(stack.stops.get(), 0);
    }

    #[test]
    fn connection_ends_advertising() {
        let adv = controller();
        let stack = ScriptedStack::default();
        adv.start(&stack).unwrap();

        adv.on_link_established();
        assert_eq!(adv.state(), AdvertisingState::Idle);
        assert_eq!(adv.toggle(&stack), Ok(AdvertisingState::Advertising));
    }

    #[test]
    fn stack_reported_end_returns_to_idle() {
        let adv = controller();
        let stack = ScriptedStack::default();
        adv.start(&stack).unwrap();

        adv.on_advertising_ended();
        assert_eq!(adv.state(), AdvertisingState::Idle);

        // One press brings it back, no dead stop first.
        assert_eq!(adv.toggle(&stack), Ok(AdvertisingState::Advertising));
        assert_eq!(stack.starts.get(), 2);
        assert_eq!(stack.stops.get(), 0);
    }
}
