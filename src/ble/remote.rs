//! Remote data intake.
//!
//! A write on the data characteristic arrives as a borrowed slice owned by
//! the stack. It is copied into a bounded local buffer before anything
//! else looks at it; writes over the bound are dropped whole, never cut.

use heapless::Vec;

use super::LinkHandle;
use crate::config::REMOTE_DATA_MAX_LEN;
use crate::error::Error;

/// Owned copy of one inbound write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCommand {
    data: Vec<u8, REMOTE_DATA_MAX_LEN>,
}

impl PendingCommand {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload as text, when it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.data).ok()
    }
}

pub struct RemoteDataReceiver {
    max_len: usize,
}

impl RemoteDataReceiver {
    /// `max_len` is clamped to the buffer capacity.
    pub const fn new(max_len: usize) -> Self {
        let max_len = if max_len > REMOTE_DATA_MAX_LEN {
            REMOTE_DATA_MAX_LEN
        } else {
            max_len
        };
        Self { max_len }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn on_data_received<C: LinkHandle>(
        &self,
        conn: &C,
        data: &[u8],
    ) -> Result<PendingCommand, Error> {
        if data.len() > self.max_len {
            warn!(
                "Dropped {} bytes from {} (max {})",
                data.len(),
                conn.peer(),
                self.max_len
            );
            return Err(Error::PayloadTooLarge {
                len: data.len(),
                max: self.max_len,
            });
        }

        let mut command = PendingCommand { data: Vec::new() };
        command
            .data
            .extend_from_slice(data)
            .map_err(|_| Error::PayloadTooLarge {
                len: data.len(),
                max: self.max_len,
            })?;

        info!("Received data from {}. Len: {}", conn.peer(), command.len());
        match command.as_str() {
            Some(text) => info!("Data: {}", text),
            None => info!("Data: {=[u8]:x}", command.as_bytes()),
        }

        Ok(command)
    }
}
