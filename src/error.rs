//! Unified error type for lbs-session.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Derives `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The radio stack rejected a request.
    Ble(BleError),

    /// `start` requested while already advertising.
    AdvertisingAlreadyActive,

    /// `stop` requested while idle.
    AdvertisingNotActive,

    /// Device name does not fit in a legacy advertising PDU.
    AdvertisingDataTooLong,

    /// Inbound write larger than the characteristic allows.
    PayloadTooLarge { len: usize, max: usize },

    /// Advertising could not be brought up during startup.
    StartupAdvertising(BleError),

    /// GATT service registration failed.
    ServiceInit,
}

/// Subset of BLE errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// Raw error code from the SoftDevice.
    Raw(u32),
    /// Advertising could not be started or stopped.
    AdvertisingFailed,
    /// Notification could not be queued.
    NotifyFailed,
    /// Disconnect request was refused.
    DisconnectFailed,
}

/// How a failure is handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// Startup is aborted, no retry.
    FatalStartup,
    /// Logged, state unchanged; the next user action may retry.
    Transient,
    /// Peer sent something we can't take; dropped.
    PayloadAnomaly,
}

impl Error {
    /// Classification used by the session and the firmware entry point.
    ///
    /// Radio failures are transient once the device is running; the
    /// startup path reports them as `StartupAdvertising` instead.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ServiceInit | Error::AdvertisingDataTooLong | Error::StartupAdvertising(_) => {
                ErrorKind::FatalStartup
            }
            Error::PayloadTooLarge { .. } => ErrorKind::PayloadAnomaly,
            Error::Ble(_) | Error::AdvertisingAlreadyActive | Error::AdvertisingNotActive => {
                ErrorKind::Transient
            }
        }
    }
}

// Convenience conversions

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Error::Ble(e)
    }
}
