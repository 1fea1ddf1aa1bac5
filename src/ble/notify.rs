//! Notification publisher.
//!
//! Keeps one subscription flag per notifiable characteristic (set by CCCD
//! writes, cleared on disconnect) and sends only to the link that is
//! registered at the moment of the send.

use core::sync::atomic::{AtomicBool, Ordering};

use super::registry::ConnectionRegistry;
use super::{BleStack, Characteristic};
use crate::error::Error;

/// Encoding of button notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportFormat {
    /// One byte, `1` pressed / `0` released (LED Button Service).
    Level,
    /// `[button_index, pressed]` (remote control variant).
    Indexed,
}

/// Logical button level change to publish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonReport {
    /// 1-based logical button number.
    pub button: u8,
    pub pressed: bool,
}

impl ButtonReport {
    pub const MAX_ENCODED_LEN: usize = 2;

    /// Write the wire form into `buf`, returning the used length.
    pub fn encode(&self, format: ReportFormat, buf: &mut [u8; Self::MAX_ENCODED_LEN]) -> usize {
        match format {
            ReportFormat::Level => {
                buf[0] = self.pressed as u8;
                1
            }
            ReportFormat::Indexed => {
                buf[0] = self.button;
                buf[1] = self.pressed as u8;
                2
            }
        }
    }
}

/// What a publish attempt did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Publish {
    /// Notification handed to the stack.
    Sent,
    /// No live link or no subscription; nothing sent.
    Skipped,
}

pub struct NotificationPublisher {
    subscriptions: [AtomicBool; Characteristic::COUNT],
    format: ReportFormat,
}

impl NotificationPublisher {
    pub const fn new(format: ReportFormat) -> Self {
        Self {
            subscriptions: [AtomicBool::new(false), AtomicBool::new(false)],
            format,
        }
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }

    pub fn is_enabled(&self, characteristic: Characteristic) -> bool {
        self.subscriptions[characteristic.index()].load(Ordering::Acquire)
    }

    pub fn on_subscription_changed(&self, characteristic: Characteristic, enabled: bool) {
        self.subscriptions[characteristic.index()].store(enabled, Ordering::Release);
        if enabled {
            info!("Notifications enabled on {}", characteristic);
        } else {
            info!("Notifications disabled on {}", characteristic);
        }
    }

    /// Drop every subscription. Called when the link goes away, whether or
    /// not the peer unsubscribed first.
    pub fn reset(&self) {
        for flag in &self.subscriptions {
            flag.store(false, Ordering::Release);
        }
    }

    /// Publish a button level. `Skipped` (not an error) without a live,
    /// subscribed link.
    pub fn publish_button_state<S: BleStack>(
        &self,
        stack: &S,
        registry: &ConnectionRegistry<S::Conn>,
        report: ButtonReport,
    ) -> Result<Publish, Error> {
        let mut buf = [0u8; ButtonReport::MAX_ENCODED_LEN];
        let len = report.encode(self.format, &mut buf);
        let value = &buf[..len];

        if let Err(e) = stack.set_value(Characteristic::ButtonState, value) {
            warn!("Couldn't update button value (err {})", e);
        }

        self.publish(stack, registry, Characteristic::ButtonState, value)
    }

    pub fn publish_command_response<S: BleStack>(
        &self,
        stack: &S,
        registry: &ConnectionRegistry<S::Conn>,
        response: &[u8],
    ) -> Result<Publish, Error> {
        self.publish(stack, registry, Characteristic::CommandResponse, response)
    }

    fn publish<S: BleStack>(
        &self,
        stack: &S,
        registry: &ConnectionRegistry<S::Conn>,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<Publish, Error> {
        // Counted clone: stays valid even if the disconnect callback
        // releases the registry's reference while we send. Taken before the
        // flag is read; a link registered after this point starts
        // unsubscribed and never receives this value.
        let Some(conn) = registry.current() else {
            trace!("No connection - skipping {}", characteristic);
            return Ok(Publish::Skipped);
        };

        if !self.is_enabled(characteristic) {
            trace!("{} not subscribed - skipping", characteristic);
            return Ok(Publish::Skipped);
        }

        match stack.notify(&conn, characteristic, value) {
            Ok(()) => Ok(Publish::Sent),
            Err(e) => {
                error!("Couldn't send notification on {} (err {})", characteristic, e);
                Err(Error::Ble(e))
            }
        }
    }
}
