//! Application-wide constants and compile-time configuration.
//!
//! All button roles, timing parameters, and protocol constants live here
//! so they can be tuned in one place. `SessionConfig` carries the subset
//! the session controller needs at construction time.

use crate::ble::notify::ReportFormat;

// BLE

/// Complete local name placed in the advertising data.
pub const DEVICE_NAME: &str = "Nordic_LBS";

/// LED Button Service UUID, advertised in the scan response.
pub const LBS_SERVICE_UUID: u128 = 0x00001523_1212_efde_1523_785feabcd123;

/// ATT MTU requested from the SoftDevice.
pub const ATT_MTU: u16 = 247;

/// Largest write accepted on the remote data characteristic
/// (ATT MTU minus the 3-byte ATT write header).
pub const REMOTE_DATA_MAX_LEN: usize = ATT_MTU as usize - 3;

/// HCI "Remote User Terminated Connection", used for every
/// locally initiated disconnect.
pub const HCI_REMOTE_USER_TERMINATED_CONNECTION: u8 = 0x13;

/// Advertising interval (in 0.625 ms units). 160 = 100 ms.
pub const ADV_INTERVAL: u32 = 160;

/// Pair with passkey display and keep bonds for the session.
pub const SECURITY_ENABLED: bool = true;

/// Restart advertising by itself after the central disconnects.
/// Off by default: a press on the advertising button brings it back.
pub const ADV_RESUME_ON_DISCONNECT: bool = false;

/// Encoding of button notifications.
pub const REPORT_FORMAT: ReportFormat = ReportFormat::Level;

// Buttons
//
// Logical button masks as delivered by the button driver
// (nRF52840-DK: BUTTON1..BUTTON4 → P0.11, P0.12, P0.24, P0.25).

/// Button 1 - level is reported to the central.
pub const BUTTON_REPORT: u32 = 1 << 0;

/// Button 2 - toggles advertising.
pub const BUTTON_ADV_TOGGLE: u32 = 1 << 1;

/// Button 3 - disconnects the current central.
pub const BUTTON_DISCONNECT: u32 = 1 << 2;

/// Button 4 - reserved (name change in a later revision).
pub const BUTTON_RESERVED: u32 = 1 << 3;

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 50;

// LEDs (nRF52840-DK: LED1..LED3 → P0.13, P0.14, P0.15, active-low)

/// Heartbeat period of the RUN LED (ms).
pub const RUN_LED_BLINK_INTERVAL_MS: u64 = 1000;

/// Runtime configuration handed to [`crate::session::SessionController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionConfig {
    pub device_name: &'static str,
    pub service_uuid: u128,
    pub report_format: ReportFormat,
    /// Upper bound for inbound data writes; clamped to
    /// [`REMOTE_DATA_MAX_LEN`].
    pub max_payload_len: usize,
    pub resume_advertising_on_disconnect: bool,
    pub security_enabled: bool,
}

impl SessionConfig {
    pub const fn new() -> Self {
        Self {
            device_name: DEVICE_NAME,
            service_uuid: LBS_SERVICE_UUID,
            report_format: REPORT_FORMAT,
            max_payload_len: REMOTE_DATA_MAX_LEN,
            resume_advertising_on_disconnect: ADV_RESUME_ON_DISCONNECT,
            security_enabled: SECURITY_ENABLED,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
