//! Per-connection state owned by the dispatch engine.
//!
//! A `Session` owns everything the dispatcher and the wait layer touch:
//! the transport, the channel and listener sets, the brigade, the
//! application hooks and every resumption marker. All of it is driven
//! from one thread; suspension is a `WouldBlock` return, resumption is
//! a fresh call.

use tracing::{debug, info, warn};

use crate::brigade::Brigade;
use crate::channel::{Channel, ChannelSet, ChannelWindow};
use crate::config::SessionConfig;
use crate::dispatch::AcceptorState;
use crate::error::SkiffError;
use crate::hooks::{NoHooks, SessionHooks};
use crate::listener::ListenerSet;
use crate::state::{ConnectionPhase, DispatchProgress};
use crate::transport::{RawPacket, Transport};

/// Drives a key re-exchange on behalf of the dispatcher.
///
/// The exchange reads its own replies through the session (e.g. with
/// [`Session::require`]) and may return `WouldBlock`; it is called
/// again until it returns `Ok`. The session moves the connection phase
/// back to `Connected` afterwards.
pub trait KeyExchange<T: Transport> {
    fn exchange(&mut self, session: &mut Session<T>) -> Result<(), SkiffError>;
}

pub struct Session<T: Transport> {
    pub(crate) transport: T,
    pub(crate) config: SessionConfig,
    pub(crate) phase: ConnectionPhase,
    pub(crate) channels: ChannelSet,
    pub(crate) listeners: ListenerSet,
    pub(crate) brigade: Brigade,
    pub(crate) hooks: Box<dyn SessionHooks>,
    /// `None` while the exchange is running (it borrows the session).
    pub(crate) kex: Option<Box<dyn KeyExchange<T>>>,
    pub(crate) has_kex: bool,
    pub(crate) progress: DispatchProgress,
    pub(crate) listener_acceptor: AcceptorState,
    pub(crate) x11_acceptor: AcceptorState,
    /// Message whose dispatch blocked; re-dispatched before reading more.
    pub(crate) inflight: Option<RawPacket>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            phase: ConnectionPhase::default(),
            channels: ChannelSet::new(),
            listeners: ListenerSet::new(),
            brigade: Brigade::new(),
            hooks: Box::new(NoHooks),
            kex: None,
            has_kex: false,
            progress: DispatchProgress::default(),
            listener_acceptor: AcceptorState::default(),
            x11_acceptor: AcceptorState::default(),
            inflight: None,
        }
    }

    pub fn with_hooks(mut self, hooks: impl SessionHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn set_key_exchange(&mut self, kex: Box<dyn KeyExchange<T>>) {
        self.kex = Some(kex);
        self.has_kex = true;
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> &ConnectionPhase {
        &self.phase
    }

    pub fn phase_mut(&mut self) -> &mut ConnectionPhase {
        &mut self.phase
    }

    pub fn is_disconnected(&self) -> bool {
        self.phase.is_disconnected()
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut ChannelSet {
        &mut self.channels
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerSet {
        &mut self.listeners
    }

    pub fn brigade(&self) -> &Brigade {
        &self.brigade
    }

    pub fn brigade_mut(&mut self) -> &mut Brigade {
        &mut self.brigade
    }

    pub fn progress(&self) -> &DispatchProgress {
        &self.progress
    }

    /// Whether a message is held for re-dispatch after a blocked write.
    pub fn has_inflight(&self) -> bool {
        self.inflight.is_some()
    }

    // ── Transport pump ────────────────────────────────────────────

    /// Read and dispatch at most one message.
    ///
    /// Returns the type octet of the dispatched message, or `None` when
    /// the transport has nothing yet. A message whose dispatch blocked
    /// is kept and dispatched again by the next call before anything new
    /// is read. A pending key re-exchange is resumed first.
    pub fn pump(&mut self) -> Result<Option<u8>, SkiffError> {
        if self.phase.is_disconnected() {
            return Err(SkiffError::PeerDisconnected);
        }
        if matches!(self.phase, ConnectionPhase::Rekeying) && self.kex.is_some() {
            self.drive_key_exchange()?;
        }

        let packet = match self.inflight.take() {
            Some(packet) => packet,
            None => match self.transport.read_packet()? {
                Some(packet) => packet,
                None => return Ok(None),
            },
        };
        let Some(&message_type) = packet.payload.first() else {
            return Err(SkiffError::ProtocolViolation("empty payload"));
        };

        match self.dispatch(packet.payload.clone(), packet.mac) {
            Ok(()) => Ok(Some(message_type)),
            Err(e) if e.is_would_block() => {
                // Idle progress means the message was consumed (a rekey
                // blocked after queuing it); a set inflight slot belongs
                // to a pump nested inside the key exchange.
                if !self.progress.is_idle() && self.inflight.is_none() {
                    self.inflight = Some(packet);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    // ── Key re-exchange ───────────────────────────────────────────

    /// Run the key-exchange collaborator until it completes or blocks.
    pub(crate) fn drive_key_exchange(&mut self) -> Result<(), SkiffError> {
        let Some(mut kex) = self.kex.take() else {
            if !self.has_kex {
                warn!("no key exchange registered; leaving KEXINIT for the upper layer");
                if self.phase.is_exchanging_keys() {
                    self.phase.complete_handshake()?;
                }
            }
            return Ok(());
        };

        let result = kex.exchange(self);
        self.kex = Some(kex);

        match result {
            Ok(()) => {
                if self.phase.is_exchanging_keys() {
                    self.phase.complete_handshake()?;
                }
                info!("key re-exchange complete");
                Ok(())
            }
            Err(e) if e.is_would_block() => Err(e),
            Err(e) => {
                warn!("key re-exchange failed: {e}");
                self.phase.force_disconnect();
                Err(e)
            }
        }
    }

    // ── Channel allocation ────────────────────────────────────────

    /// Allocate an unlinked channel for a peer-initiated open.
    ///
    /// The send direction takes the peer's advertised window and packet
    /// size; the receive direction takes the configured defaults.
    pub(crate) fn allocate_channel(
        &mut self,
        channel_type: &str,
        remote_id: u32,
        remote_window: u32,
        remote_packet: u32,
    ) -> Result<Channel, SkiffError> {
        let in_use = self.channels.len() + self.listeners.pending_total();
        if in_use >= self.config.max_channels {
            return Err(SkiffError::ResourceExhaustion("channel limit reached"));
        }
        let local_id = self.channels.next_local_id();
        let window = ChannelWindow::new(
            self.config.channel_window,
            self.config.channel_packet_size,
            remote_window,
            remote_packet,
        );
        debug!(
            local_id,
            remote_id, remote_window, remote_packet, "allocated {channel_type} channel"
        );
        Ok(Channel::new(channel_type, local_id, remote_id, window))
    }
}

impl<T: Transport + std::fmt::Debug> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.transport)
            .field("phase", &self.phase)
            .field("channels", &self.channels.len())
            .field("listeners", &self.listeners.len())
            .field("brigade", &self.brigade.len())
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}
