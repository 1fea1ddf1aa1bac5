//! Session controller.
//!
//! One instance is built at startup and owns every piece of session
//! state. The radio stack, the GATT service and the button driver all
//! call into it through shared references, from whatever context they
//! run in; each field guards itself (critical-section mutex or atomic),
//! so no method needs `&mut self`.
//!
//! The same instance is handed to the connection-lifecycle source
//! ([`ConnectionEvents`]) and the application-data source
//! ([`RemoteServiceEvents`]).

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::ble::advertising::{AdvertisingController, AdvertisingPayload, AdvertisingState};
use crate::ble::notify::{ButtonReport, NotificationPublisher, Publish};
use crate::ble::registry::{ConnectOutcome, ConnectionRegistry, DisconnectOutcome};
use crate::ble::remote::{PendingCommand, RemoteDataReceiver};
use crate::ble::security::{SecurityCallbacks, SecurityStrategy};
use crate::ble::{
    BleStack, Characteristic, ConnectionEvents, Indicators, LinkHandle, RemoteServiceEvents,
    SecurityLevel,
};
use crate::config::{SessionConfig, BUTTON_REPORT, HCI_REMOTE_USER_TERMINATED_CONNECTION};
use crate::error::Error;
use crate::ui::dispatch::{self, button_number};
use crate::ui::{ButtonAction, ButtonMask, Led};

pub struct SessionController<S: BleStack, I: Indicators> {
    stack: S,
    indicators: I,
    config: SessionConfig,
    registry: ConnectionRegistry<S::Conn>,
    advertising: AdvertisingController,
    publisher: NotificationPublisher,
    receiver: RemoteDataReceiver,
    security: SecurityStrategy,
    /// Last reported level of the report button (served to reads).
    button_level: AtomicBool,
    presses: AtomicU32,
}

impl<S: BleStack, I: Indicators> SessionController<S, I> {
    /// Build the controller. Fails only if the advertising payload can't
    /// be encoded, which is fatal at startup.
    pub fn new(stack: S, indicators: I, config: SessionConfig) -> Result<Self, Error> {
        let payload = AdvertisingPayload::new(config.device_name, config.service_uuid)?;

        if config.security_enabled {
            info!("Pairing enabled");
        } else {
            info!("Pairing disabled");
        }

        Ok(Self {
            stack,
            indicators,
            config,
            registry: ConnectionRegistry::new(),
            advertising: AdvertisingController::new(payload),
            publisher: NotificationPublisher::new(config.report_format),
            receiver: RemoteDataReceiver::new(config.max_payload_len),
            security: SecurityStrategy::from_config(config.security_enabled),
            button_level: AtomicBool::new(false),
            presses: AtomicU32::new(0),
        })
    }

    /// Bring up advertising once services are registered.
    pub fn start(&self) -> Result<AdvertisingState, Error> {
        self.advertising.start(&self.stack).map_err(|e| match e {
            Error::Ble(ble) => {
                error!("Advertising failed to start (err {})", ble);
                Error::StartupAdvertising(ble)
            }
            other => other,
        })
    }

    /// Entry point for the button driver: one call per debounced edge.
    pub fn on_buttons_changed(&self, mask: ButtonMask) {
        let pressed = mask.pressed();
        if pressed != 0 {
            let total = self
                .presses
                .fetch_add(pressed.count_ones(), Ordering::Relaxed)
                .wrapping_add(pressed.count_ones());
            info!(
                "Button {} pressed, total presses {}",
                button_number(pressed).unwrap_or(0),
                total
            );
        }

        for action in dispatch::actions(mask) {
            self.handle_action(action);
        }
    }

    fn handle_action(&self, action: ButtonAction) {
        match action {
            ButtonAction::Report { pressed } => {
                // Publisher errors are already logged; nothing to roll back.
                let _ = self.publish_button_state(pressed);
            }
            ButtonAction::ToggleAdvertising => {
                let _ = self.advertising.toggle(&self.stack);
            }
            ButtonAction::Disconnect => {
                let _ = self.disconnect();
            }
            ButtonAction::Reserved => debug!("Reserved button pressed - no action"),
        }
    }

    /// Record and publish the report button's level.
    pub fn publish_button_state(&self, pressed: bool) -> Result<Publish, Error> {
        self.button_level.store(pressed, Ordering::Release);
        let report = ButtonReport {
            button: button_number(BUTTON_REPORT).unwrap_or(1),
            pressed,
        };
        self.publisher
            .publish_button_state(&self.stack, &self.registry, report)
    }

    pub fn publish_command_response(&self, response: &[u8]) -> Result<Publish, Error> {
        self.publisher
            .publish_command_response(&self.stack, &self.registry, response)
    }

    /// Ask the stack to drop the current link. `Ok(false)` when there is
    /// none. The registry is only cleared by the disconnected event.
    pub fn disconnect(&self) -> Result<bool, Error> {
        let Some(conn) = self.registry.current() else {
            info!("No connection to drop");
            return Ok(false);
        };

        match self
            .stack
            .disconnect(&conn, HCI_REMOTE_USER_TERMINATED_CONNECTION)
        {
            Ok(()) => {
                info!("Disconnecting {}", conn.peer());
                Ok(true)
            }
            Err(e) => {
                warn!("Disconnect of {} failed (err {})", conn.peer(), e);
                Err(Error::Ble(e))
            }
        }
    }

    /// Validate and copy one inbound data write.
    pub fn receive_data(&self, conn: &S::Conn, data: &[u8]) -> Result<PendingCommand, Error> {
        self.receiver.on_data_received(conn, data)
    }

    /// Press edges seen so far, whatever their action did.
    pub fn presses(&self) -> u32 {
        self.presses.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn indicators(&self) -> &I {
        &self.indicators
    }

    pub fn registry(&self) -> &ConnectionRegistry<S::Conn> {
        &self.registry
    }

    pub fn advertising(&self) -> &AdvertisingController {
        &self.advertising
    }

    pub fn publisher(&self) -> &NotificationPublisher {
        &self.publisher
    }

    pub fn receiver(&self) -> &RemoteDataReceiver {
        &self.receiver
    }

    pub fn security(&self) -> &SecurityStrategy {
        &self.security
    }

    fn end_connection_scope(&self) {
        self.publisher.reset();
        self.security.reset();
    }

    /// Drive the connection LED from the registry. Re-reads after the
    /// write: a connect or disconnect landing during it leaves the LED
    /// matching whatever is registered now.
    fn sync_connection_led(&self) {
        let mut connected = self.registry.is_connected();
        loop {
            self.indicators.set(Led::Connection, connected);
            let now = self.registry.is_connected();
            if now == connected {
                break;
            }
            connected = now;
        }
    }
}

impl<S: BleStack, I: Indicators> ConnectionEvents for SessionController<S, I> {
    type Conn = S::Conn;

    fn on_connected(&self, conn: &S::Conn, result: Result<(), u8>) {
        let outcome = self
            .registry
            .on_connected_with(conn, result, || self.end_connection_scope());
        match outcome {
            ConnectOutcome::Rejected => {}
            ConnectOutcome::Registered => {
                self.advertising.on_link_established();
                self.sync_connection_led();
            }
            // LED is already on; the stale link's scope ended with the swap.
            ConnectOutcome::Replaced => self.advertising.on_link_established(),
        }
    }

    fn on_disconnected(&self, conn: &S::Conn, reason: u8) {
        let outcome = self
            .registry
            .on_disconnected_with(conn, reason, || self.end_connection_scope());
        if outcome != DisconnectOutcome::Released {
            return;
        }

        self.sync_connection_led();

        if self.config.resume_advertising_on_disconnect && !self.registry.is_connected() {
            if let Err(e) = self.advertising.start(&self.stack) {
                warn!("Couldn't resume advertising (err {})", e);
            }
        }
    }

    fn on_security_changed(&self, conn: &S::Conn, level: SecurityLevel, result: Result<(), u8>) {
        self.security
            .on_security_changed(&conn.peer(), level, result)
    }

    fn on_passkey_display(&self, conn: &S::Conn, passkey: u32) {
        self.security.on_passkey_display(&conn.peer(), passkey)
    }

    fn on_pairing_cancel(&self, conn: &S::Conn) {
        self.security.on_pairing_cancel(&conn.peer())
    }

    fn on_pairing_complete(&self, conn: &S::Conn, bonded: bool) {
        self.security.on_pairing_complete(&conn.peer(), bonded)
    }

    fn on_pairing_failed(&self, conn: &S::Conn, reason: u8) {
        self.security.on_pairing_failed(&conn.peer(), reason)
    }
}

impl<S: BleStack, I: Indicators> RemoteServiceEvents for SessionController<S, I> {
    type Conn = S::Conn;

    fn on_subscription_changed(&self, characteristic: Characteristic, enabled: bool) {
        self.publisher.on_subscription_changed(characteristic, enabled)
    }

    fn on_data_received(&self, conn: &S::Conn, data: &[u8]) {
        // Dropped payloads are logged by the receiver.
        let _ = self.receive_data(conn, data);
    }

    fn led_cb(&self, on: bool) {
        info!("User LED {}", if on { "on" } else { "off" });
        self.indicators.set(Led::User, on);
    }

    fn button_cb(&self) -> bool {
        self.button_level.load(Ordering::Acquire)
    }
}
