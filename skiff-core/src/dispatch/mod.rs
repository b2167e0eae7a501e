//! Incoming message dispatcher.
//!
//! Classifies each decrypted message, applies the protocol reactions
//! that cannot wait for an upper layer, and queues everything else in
//! the brigade.
//!
//! # Resumption
//!
//! Any step that writes a reply can return `WouldBlock`. The dispatcher
//! records where it stopped in [`DispatchProgress`] (and, for channel
//! opens, in the acceptor state) and must then be called again with the
//! same message. The retry continues at the blocked write without
//! re-parsing or repeating side effects.
//!
//! ```text
//! message ──► integrity ──► classify ─┬─► handled here (reply?) ──► done
//!                                     ├─► acceptor (reply)       ──► done
//!                                     └─► brigade ──► rekey check ──► done
//! ```

mod acceptor;

pub use acceptor::{AcceptorKind, AcceptorState, OpenRequest};

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::channel::ExtendedDataMode;
use crate::error::SkiffError;
use crate::message::{self, MessageType};
use crate::packet::{IncomingMessage, MacStatus};
use crate::session::Session;
use crate::state::DispatchProgress;
use crate::transport::Transport;
use crate::wire::{self, WireReader};

/// Bytes before channel data: type, recipient channel, data length.
pub const DATA_HEADER: usize = 9;

/// Bytes before extended channel data: as above plus the stream id.
pub const EXTENDED_DATA_HEADER: usize = 13;

impl<T: Transport> Session<T> {
    /// Dispatch one decrypted message.
    ///
    /// On `WouldBlock`, call again with the same `payload` and `mac`. If
    /// [`progress`](Session::progress) is idle after a `WouldBlock`, the
    /// message was already consumed and a key re-exchange is pending;
    /// the next [`pump`](Session::pump) resumes it.
    pub fn dispatch(&mut self, payload: Bytes, mac: MacStatus) -> Result<(), SkiffError> {
        if payload.is_empty() {
            return Err(SkiffError::ProtocolViolation("empty payload"));
        }

        let mut mac = mac;
        if self.progress.is_idle() {
            self.listener_acceptor.reset();
            self.x11_acceptor.reset();
            trace!(
                message_type = payload[0],
                len = payload.len(),
                "message received"
            );
            mac = self.check_integrity(&payload, mac)?;
            self.progress = DispatchProgress::Classified;
        }

        let result = self.resume_dispatch(&payload, mac);
        if !matches!(&result, Err(e) if e.is_would_block()) {
            self.progress = DispatchProgress::Idle;
        }
        result
    }

    fn check_integrity(&mut self, payload: &[u8], mac: MacStatus) -> Result<MacStatus, SkiffError> {
        if mac != MacStatus::Invalid {
            return Ok(mac);
        }
        if self.hooks.integrity_failure(payload) {
            warn!("invalid MAC accepted by application");
            return Ok(MacStatus::ConfirmedDespiteMismatch);
        }
        self.hooks
            .disconnect(message::DISCONNECT_MAC_ERROR, "Invalid MAC received", "");
        Err(SkiffError::InvalidIntegrityCheck)
    }

    fn resume_dispatch(&mut self, payload: &Bytes, mac: MacStatus) -> Result<(), SkiffError> {
        match self.progress.clone() {
            DispatchProgress::Idle => Ok(()),
            DispatchProgress::Classified => self.classify(payload, mac),
            DispatchProgress::Replying(reply) => self.transport.write(&reply),
            DispatchProgress::Accepting(kind) => self.run_acceptor(kind, payload),
            DispatchProgress::Queued => self.rekey_check(payload[0]),
        }
    }

    fn classify(&mut self, payload: &Bytes, mac: MacStatus) -> Result<(), SkiffError> {
        let (queued, header_skip) = match MessageType::try_from(payload[0]) {
            Ok(MessageType::Disconnect) => return self.handle_disconnect(payload),
            Ok(MessageType::Ignore) => {
                self.handle_ignore(payload);
                return Ok(());
            }
            Ok(MessageType::Debug) => return self.handle_debug(payload),
            Ok(MessageType::GlobalRequest) => return self.handle_global_request(payload),
            Ok(MessageType::ChannelData) => match self.handle_channel_data(payload, false)? {
                Some(kept) => (kept, DATA_HEADER),
                None => return Ok(()),
            },
            Ok(MessageType::ChannelExtendedData) => {
                match self.handle_channel_data(payload, true)? {
                    Some(kept) => (kept, EXTENDED_DATA_HEADER),
                    None => return Ok(()),
                }
            }
            Ok(MessageType::ChannelEof) => return self.handle_channel_eof(payload),
            Ok(MessageType::ChannelClose) => return self.handle_channel_close(payload),
            Ok(MessageType::ChannelRequest) => return self.handle_channel_request(payload),
            Ok(MessageType::ChannelWindowAdjust) => return self.handle_window_adjust(payload),
            Ok(MessageType::ChannelOpen) => match acceptor::acceptor_for(payload) {
                Some(kind) => {
                    self.progress = DispatchProgress::Accepting(kind);
                    return self.run_acceptor(kind, payload);
                }
                None => (payload.clone(), 0),
            },
            _ => (payload.clone(), 0),
        };

        self.brigade.push(IncomingMessage::new(queued, header_skip, mac));
        self.progress = DispatchProgress::Queued;
        self.rekey_check(payload[0])
    }

    /// Write `reply`, leaving the dispatcher resumable at this write.
    fn send_reply(&mut self, reply: Bytes) -> Result<(), SkiffError> {
        self.progress = DispatchProgress::Replying(reply.clone());
        self.transport.write(&reply)
    }

    // ── Transport-level messages ──────────────────────────────────

    fn handle_disconnect(&mut self, payload: &[u8]) -> Result<(), SkiffError> {
        let mut r = WireReader::at(payload, 1)?;
        let reason = r.u32().unwrap_or(0);
        let text = r.text().unwrap_or_default();
        let language = r.text().unwrap_or_default();

        self.hooks.disconnect(reason, &text, &language);
        info!(reason, "peer disconnected: {text}");
        self.phase.force_disconnect();
        Err(SkiffError::PeerDisconnected)
    }

    fn handle_ignore(&mut self, payload: &[u8]) {
        let data = WireReader::at(payload, 1)
            .and_then(|mut r| r.string())
            .unwrap_or(&[]);
        trace!(len = data.len(), "ignore message");
        self.hooks.ignore(data);
    }

    fn handle_debug(&mut self, payload: &[u8]) -> Result<(), SkiffError> {
        let mut r = WireReader::at(payload, 1)?;
        let always_display = r.bool().unwrap_or(false);
        let text = r.text().unwrap_or_default();
        let language = r.text().unwrap_or_default();

        debug!(always_display, "debug message: {text}");
        self.hooks.debug(always_display, &text, &language);
        Ok(())
    }

    fn handle_global_request(&mut self, payload: &[u8]) -> Result<(), SkiffError> {
        let mut r = WireReader::at(payload, 1)?;
        let name = String::from_utf8_lossy(r.string()?).into_owned();
        let want_reply = r.bool()?;

        debug!(want_reply, "global request {name}");
        if want_reply {
            return self.send_reply(wire::request_failure());
        }
        Ok(())
    }

    // ── Channel messages ──────────────────────────────────────────

    /// Apply flow control to a data message.
    ///
    /// Returns the payload to queue, truncated to what the receive
    /// window admits, or `None` when the message is dropped.
    fn handle_channel_data(
        &mut self,
        payload: &Bytes,
        extended: bool,
    ) -> Result<Option<Bytes>, SkiffError> {
        let header = if extended {
            EXTENDED_DATA_HEADER
        } else {
            DATA_HEADER
        };
        let mut r = WireReader::at(payload, 1)?;
        let local_id = r.u32()?;
        if payload.len() < header {
            return Err(SkiffError::Truncated {
                needed: header,
                available: payload.len(),
            });
        }
        let data_len = payload.len() - header;

        let Some(channel) = self.channels.locate_mut(local_id) else {
            debug!(local_id, "data for unknown channel, ignoring");
            return Ok(None);
        };

        if extended && channel.extended_data() == ExtendedDataMode::Ignore {
            let refund = channel.window().admissible(data_len);
            let peer = channel.remote_id();
            debug!(local_id, refund, "ignoring extended data and refunding window");
            if refund == 0 {
                return Ok(None);
            }
            return self.send_reply(wire::window_adjust(peer, refund)).map(|()| None);
        }

        if channel.window().is_exhausted() {
            warn!(local_id, data_len, "receive window is full, data ignored");
            return Ok(None);
        }
        let window = *channel.window();
        if data_len > window.local_packet_size as usize {
            warn!(
                local_id,
                data_len,
                packet_size = window.local_packet_size,
                "packet exceeds offered size, truncating"
            );
        }
        let kept = channel.window_mut().consume(data_len);
        if (kept as usize) < data_len && kept == window.local_window_size {
            warn!(local_id, data_len, kept, "data exceeds receive window, truncating");
        }
        channel.set_remote_eof(false);

        trace!(
            local_id,
            kept,
            window = channel.window().local_window_size,
            "channel data accepted"
        );
        Ok(Some(payload.slice(..header + kept as usize)))
    }

    fn handle_channel_eof(&mut self, payload: &[u8]) -> Result<(), SkiffError> {
        let local_id = WireReader::at(payload, 1)?.u32()?;
        match self.channels.locate_known(local_id) {
            Ok(channel) => {
                debug!(local_id, remote_id = channel.remote_id(), "EOF received");
                channel.set_remote_eof(true);
            }
            Err(e) => debug!("EOF: {e}, ignoring"),
        }
        Ok(())
    }

    fn handle_channel_close(&mut self, payload: &[u8]) -> Result<(), SkiffError> {
        let local_id = WireReader::at(payload, 1)?.u32()?;
        match self.channels.locate_known(local_id) {
            Ok(channel) => {
                debug!(local_id, remote_id = channel.remote_id(), "close received");
                channel.mark_remote_close();
            }
            Err(e) => debug!("close: {e}, ignoring"),
        }
        Ok(())
    }

    fn handle_channel_request(&mut self, payload: &[u8]) -> Result<(), SkiffError> {
        let mut r = WireReader::at(payload, 1)?;
        let local_id = r.u32()?;
        let request = r.string()?;
        let want_reply = r.bool()?;

        debug!(
            local_id,
            want_reply,
            "channel request {}",
            String::from_utf8_lossy(request)
        );

        if request == message::EXIT_STATUS {
            let status = r.u32()?;
            if let Some(channel) = self.channels.locate_mut(local_id) {
                debug!(local_id, status, "exit status received");
                channel.set_exit_status(status);
            }
            return Ok(());
        }

        if want_reply {
            let peer = self
                .channels
                .locate(local_id)
                .map(|c| c.remote_id())
                .unwrap_or(local_id);
            return self.send_reply(wire::channel_failure(peer));
        }
        Ok(())
    }

    fn handle_window_adjust(&mut self, payload: &[u8]) -> Result<(), SkiffError> {
        let mut r = WireReader::at(payload, 1)?;
        let local_id = r.u32()?;
        let bytes = r.u32()?;

        match self.channels.locate_known(local_id) {
            Ok(channel) => {
                channel.window_mut().grant(bytes);
                debug!(
                    local_id,
                    bytes,
                    window = channel.window().remote_window_size,
                    "window adjust received"
                );
            }
            Err(e) => debug!("window adjust: {e}, ignoring"),
        }
        Ok(())
    }

    // ── Key re-exchange trigger ───────────────────────────────────

    /// After a KEXINIT is queued outside a key exchange, reset the
    /// read-cycle markers and run the re-exchange to completion.
    fn rekey_check(&mut self, message_type: u8) -> Result<(), SkiffError> {
        if message_type != MessageType::KexInit.code() || !self.phase.is_connected() {
            return Ok(());
        }
        info!("peer requested key re-exchange");
        self.phase.begin_rekey()?;
        self.progress = DispatchProgress::Idle;
        self.inflight = None;
        self.transport.reset_read_state();
        self.drive_key_exchange()
    }
}
