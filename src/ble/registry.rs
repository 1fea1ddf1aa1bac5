//! Connection handle registry.
//!
//! Holds at most one live link. Only the connection-lifecycle callbacks
//! write it; everyone else takes a counted clone through [`current`].
//! Handles are dropped outside the critical section, so releasing one
//! never runs stack code with interrupts masked.
//!
//! [`current`]: ConnectionRegistry::current

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use super::LinkHandle;

/// Result of a connected event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectOutcome {
    /// The stack reported a failed attempt; nothing stored.
    Rejected,
    /// Registry was empty and now holds the link.
    Registered,
    /// A handle was still registered; it was released and overwritten.
    Replaced,
}

/// Result of a disconnected event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisconnectOutcome {
    /// The registered link was released.
    Released,
    /// Event for a link we don't hold (or already released).
    Unknown,
}

pub struct ConnectionRegistry<C> {
    current: Mutex<CriticalSectionRawMutex, RefCell<Option<C>>>,
}

impl<C: LinkHandle> ConnectionRegistry<C> {
    pub const fn new() -> Self {
        Self {
            current: Mutex::new(RefCell::new(None)),
        }
    }

    pub fn on_connected(&self, conn: &C, result: Result<(), u8>) -> ConnectOutcome {
        self.on_connected_with(conn, result, || {})
    }

    /// Like [`on_connected`](Self::on_connected), but runs `end_scope`
    /// inside the same critical section when a stale handle is replaced.
    pub fn on_connected_with(
        &self,
        conn: &C,
        result: Result<(), u8>,
        end_scope: impl FnOnce(),
    ) -> ConnectOutcome {
        if let Err(code) = result {
            error!("Connection failed (err {})", code);
            return ConnectOutcome::Rejected;
        }

        let previous = self.current.lock(|slot| {
            let previous = slot.borrow_mut().replace(conn.clone());
            if previous.is_some() {
                end_scope();
            }
            previous
        });

        match previous {
            None => {
                info!("Connected {}", conn.peer());
                ConnectOutcome::Registered
            }
            Some(stale) => {
                warn!(
                    "Connected {} while {} still registered - replacing",
                    conn.peer(),
                    stale.peer()
                );
                drop(stale);
                ConnectOutcome::Replaced
            }
        }
    }

    pub fn on_disconnected(&self, conn: &C, reason: u8) -> DisconnectOutcome {
        self.on_disconnected_with(conn, reason, || {})
    }

    /// Like [`on_disconnected`](Self::on_disconnected), but runs
    /// `end_scope` inside the critical section that releases the link. A
    /// link registered afterwards never sees that reset.
    pub fn on_disconnected_with(
        &self,
        conn: &C,
        reason: u8,
        end_scope: impl FnOnce(),
    ) -> DisconnectOutcome {
        let released = self.current.lock(|slot| {
            let released = {
                let mut slot = slot.borrow_mut();
                if slot.as_ref() == Some(conn) {
                    slot.take()
                } else {
                    None
                }
            };
            if released.is_some() {
                end_scope();
            }
            released
        });

        match released {
            Some(handle) => {
                info!("Disconnected {} (reason {})", handle.peer(), reason);
                drop(handle);
                DisconnectOutcome::Released
            }
            None => {
                warn!(
                    "Disconnect for unregistered link {} (reason {}) - ignored",
                    conn.peer(),
                    reason
                );
                DisconnectOutcome::Unknown
            }
        }
    }

    /// Counted reference to the live link, if any.
    pub fn current(&self) -> Option<C> {
        self.current.lock(|slot| slot.borrow().clone())
    }

    pub fn is_connected(&self) -> bool {
        self.current.lock(|slot| slot.borrow().is_some())
    }

    /// True if `conn` is the registered link.
    pub fn is_current(&self, conn: &C) -> bool {
        self.current
            .lock(|slot| slot.borrow().as_ref() == Some(conn))
    }
}

impl<C: LinkHandle> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::PeerAddr;
    use core::cell::Cell;
    use std::sync::Arc;

    #[derive(Clone, Debug)]
    struct Link {
        id: u8,
        refs: Arc<()>,
    }

    impl Link {
        fn new(id: u8) -> Self {
            Self {
                id,
                refs: Arc::new(()),
            }
        }

        fn refs(&self) -> usize {
            Arc::strong_count(&self.refs)
        }
    }

    impl PartialEq for Link {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl LinkHandle for Link {
        fn peer(&self) -> PeerAddr {
            PeerAddr([self.id, 0, 0, 0, 0, 0])
        }
    }

    #[test]
    fn starts_empty() {
        let registry = ConnectionRegistry::<Link>::new();
        assert!(!registry.is_connected());
        assert!(registry.current().is_none());
    }

    #[test]
    fn failed_connect_is_discarded() {
        let registry = ConnectionRegistry::new();
        let link = Link::new(1);
        assert_eq!(registry.on_connected(&link, Err(0x3e)), ConnectOutcome::Rejected);
        assert!(!registry.is_connected());
        assert_eq!(link.refs(), 1);
    }

    #[test]
    fn connect_acquires_and_disconnect_releases() {
        let registry = ConnectionRegistry::new();
        let link = Link::new(1);

        assert_eq!(registry.on_connected(&link, Ok(())), ConnectOutcome::Registered);
        assert_eq!(link.refs(), 2);
        assert!(registry.is_current(&link));

        assert_eq!(registry.on_disconnected(&link, 0x13), DisconnectOutcome::Released);
        assert_eq!(link.refs(), 1);
        assert!(registry.current().is_none());
    }

    #[test]
    fn scope_ends_only_when_a_handle_goes() {
        let registry = ConnectionRegistry::new();
        let ended = Cell::new(0);
        let end = || ended.set(ended.get() + 1);

        registry.on_connected_with(&Link::new(1), Ok(()), end);
        assert_eq!(ended.get(), 0);

        registry.on_connected_with(&Link::new(2), Ok(()), end);
        assert_eq!(ended.get(), 1);

        registry.on_disconnected_with(&Link::new(1), 0x13, end);
        assert_eq!(ended.get(), 1);

        registry.on_disconnected_with(&Link::new(2), 0x13, end);
        assert_eq!(ended.get(), 2);
        assert!(!registry.is_connected());
    }

    #[test]
    fn second_connect_replaces_and_releases_stale_handle() {
        let registry = ConnectionRegistry::new();
        let first = Link::new(1);
        let second = Link::new(2);

        registry.on_connected(&first, Ok(()));
        assert_eq!(registry.on_connected(&second, Ok(())), ConnectOutcome::Replaced);

        assert_eq!(first.refs(), 1);
        assert_eq!(registry.current(), Some(second.clone()));
    }

    #[test]
    fn mismatched_disconnect_is_ignored() {
        let registry = ConnectionRegistry::new();
        let held = Link::new(1);
        registry.on_connected(&held, Ok(()));

        assert_eq!(
            registry.on_disconnected(&Link::new(9), 0x08),
            DisconnectOutcome::Unknown
        );
        assert_eq!(registry.current(), Some(held.clone()));
        assert_eq!(held.refs(), 2);
    }

    #[test]
    fn repeated_disconnect_is_unknown() {
        let registry = ConnectionRegistry::new();
        let link = Link::new(1);
        registry.on_connected(&link, Ok(()));

        assert_eq!(registry.on_disconnected(&link, 0x13), DisconnectOutcome::Released);
        assert_eq!(registry.on_disconnected(&link, 0x13), DisconnectOutcome::Unknown);
        assert_eq!(link.refs(), 1);
    }

    #[test]
    fn current_clone_outlives_release() {
        let registry = ConnectionRegistry::new();
        let link = Link::new(1);
        registry.on_connected(&link, Ok(()));

        let borrowed = registry.current().unwrap();
        registry.on_disconnected(&link, 0x13);

        assert_eq!(borrowed.refs(), 2);
        drop(borrowed);
        assert_eq!(link.refs(), 1);
    }
}
