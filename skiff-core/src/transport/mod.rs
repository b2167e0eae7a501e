//! The byte-level transport consumed by the dispatcher.
//!
//! Framing, encryption and MAC verification live below this trait. The
//! dispatcher only sees whole decrypted payloads and writes whole
//! payloads back.

pub mod scripted;

use bytes::Bytes;

use crate::error::SkiffError;
use crate::packet::MacStatus;

pub use scripted::{ReadEvent, ScriptedTransport};

/// One decrypted message handed up by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub payload: Bytes,
    pub mac: MacStatus,
}

impl RawPacket {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            mac: MacStatus::Ok,
        }
    }

    pub fn with_mac(mut self, mac: MacStatus) -> Self {
        self.mac = mac;
        self
    }
}

/// Non-blocking message transport.
///
/// Both operations return `Err(SkiffError::WouldBlock)` when the socket
/// is not ready. A blocked `write` must be retried with the same bytes.
pub trait Transport {
    /// Send one message payload.
    fn write(&mut self, payload: &[u8]) -> Result<(), SkiffError>;

    /// Receive the next message; `Ok(None)` when nothing has arrived yet.
    fn read_packet(&mut self) -> Result<Option<RawPacket>, SkiffError>;

    /// Drop any partially assembled inbound packet state.
    ///
    /// Called when a key re-exchange starts from inside dispatch.
    fn reset_read_state(&mut self) {}
}
