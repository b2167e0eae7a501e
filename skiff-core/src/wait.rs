//! Waiting for specific messages.
//!
//! Upper layers never call the dispatcher directly. They ask for a
//! message type here: the brigade is searched first and, if nothing
//! qualifies, the transport is pumped one message at a time until a
//! match shows up, the read timeout expires or the connection dies.
//!
//! A wait that runs out of input returns `WouldBlock`; the caller
//! retries with the same [`WaitDeadline`] so the timeout covers the
//! whole wait rather than one attempt.

use tracing::{debug, trace};

use crate::error::SkiffError;
use crate::packet::{IncomingMessage, PayloadMatch};
use crate::session::Session;
use crate::state::WaitDeadline;
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    /// Remove the oldest queued message of `message_type` matching `filter`.
    pub fn fetch(&mut self, message_type: u8, filter: Option<&PayloadMatch>) -> Option<IncomingMessage> {
        self.brigade.take(message_type, filter)
    }

    /// Like [`fetch`](Self::fetch), trying each of `types` in order.
    pub fn fetch_any(&mut self, types: &[u8], filter: Option<&PayloadMatch>) -> Option<IncomingMessage> {
        self.brigade.take_any(types, filter)
    }

    /// Wait for a message of `message_type`, pumping the transport.
    pub fn require(
        &mut self,
        message_type: u8,
        filter: Option<&PayloadMatch>,
        deadline: &mut WaitDeadline,
    ) -> Result<IncomingMessage, SkiffError> {
        self.require_any(&[message_type], filter, deadline)
    }

    /// Wait for a message of any of `types`, pumping the transport.
    ///
    /// Returns `WouldBlock` when the transport has nothing more to read
    /// before the timeout; `deadline` then stays set for the retry. It
    /// is cleared on every other outcome.
    pub fn require_any(
        &mut self,
        types: &[u8],
        filter: Option<&PayloadMatch>,
        deadline: &mut WaitDeadline,
    ) -> Result<IncomingMessage, SkiffError> {
        if let Some(msg) = self.fetch_any(types, filter) {
            deadline.reset();
            return Ok(msg);
        }
        deadline.start();

        loop {
            match self.pump() {
                Ok(Some(message_type)) => {
                    if !types.contains(&message_type) {
                        continue;
                    }
                    if let Some(msg) = self.fetch_any(types, filter) {
                        deadline.reset();
                        return Ok(msg);
                    }
                    trace!(message_type, "wanted type arrived but did not match filter");
                }
                Ok(None) => {
                    let timeout = self.config.read_timeout();
                    if deadline.has_expired(timeout) {
                        debug!(?types, ?timeout, "timed out waiting for message");
                        deadline.reset();
                        return Err(SkiffError::Timeout(timeout));
                    }
                    return Err(SkiffError::WouldBlock);
                }
                Err(e) if e.is_would_block() => return Err(e),
                Err(e) => {
                    deadline.reset();
                    return Err(e);
                }
            }
        }
    }

    /// Remove the next message of any type and return its type octet.
    ///
    /// Takes the oldest queued message if there is one, otherwise pumps
    /// the transport until a message is queued.
    pub fn discard_next(&mut self) -> Result<u8, SkiffError> {
        if let Some(msg) = self.brigade.pop_oldest() {
            debug!(message_type = msg.message_type(), "discarded queued message");
            return Ok(msg.message_type());
        }

        loop {
            match self.pump()? {
                Some(message_type) => {
                    if self.brigade.take(message_type, None).is_some() {
                        debug!(message_type, "discarded message");
                        return Ok(message_type);
                    }
                }
                None => return Err(SkiffError::WouldBlock),
            }
        }
    }
}
