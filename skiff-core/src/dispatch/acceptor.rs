//! Acceptors for peer-initiated channel opens.
//!
//! Two kinds of open are answered by the dispatcher itself: connections
//! forwarded to one of our listeners, and X11 connections. Each runs as
//! a small state machine so that a blocked reply write can be resumed
//! without parsing the request or allocating a channel a second time.

use std::mem;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::error::SkiffError;
use crate::listener::ListenerId;
use crate::message::{self, OpenFailureReason};
use crate::session::Session;
use crate::transport::Transport;
use crate::wire::{OpenConfirmation, OpenFailure, WireReader};

/// Which acceptor owns a channel-open message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorKind {
    /// `forwarded-tcpip`: the peer forwards a connection to a listener.
    Listener,
    /// `x11`: the peer opens an X11 connection.
    X11,
}

/// Route a channel-open payload by its channel type.
pub(crate) fn acceptor_for(payload: &[u8]) -> Option<AcceptorKind> {
    let channel_type = WireReader::at(payload, 1).ok()?.string().ok()?;
    if channel_type == message::FORWARDED_TCPIP {
        Some(AcceptorKind::Listener)
    } else if channel_type == message::X11 {
        Some(AcceptorKind::X11)
    } else {
        None
    }
}

/// Fields of a channel-open request.
///
/// For `forwarded-tcpip`, `host:port` is the address the peer accepted
/// the connection on and `origin_*` is where it came from. X11 opens
/// carry only the originator, which is stored in `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub sender_channel: u32,
    pub initial_window: u32,
    pub packet_size: u32,
    pub host: String,
    pub port: u32,
    pub origin_host: String,
    pub origin_port: u32,
}

impl OpenRequest {
    pub fn parse(payload: &[u8], kind: AcceptorKind) -> Result<Self, SkiffError> {
        let mut r = WireReader::at(payload, 1)?;
        r.string()?;
        let sender_channel = r.u32()?;
        let initial_window = r.u32()?;
        let packet_size = r.u32()?;
        let host = r.text()?;
        let port = r.u32()?;
        let (origin_host, origin_port) = match kind {
            AcceptorKind::Listener => (r.text()?, r.u32()?),
            AcceptorKind::X11 => (String::new(), 0),
        };
        Ok(Self {
            sender_channel,
            initial_window,
            packet_size,
            host,
            port,
            origin_host,
            origin_port,
        })
    }
}

/// Resumable progress of one acceptor.
#[derive(Debug, Default)]
pub struct AcceptorState {
    stage: Stage,
}

#[derive(Debug, Default)]
enum Stage {
    #[default]
    Idle,
    /// Channel allocated; the confirmation is being written.
    Confirming {
        reply: Bytes,
        channel: Channel,
        request: OpenRequest,
        listener: Option<ListenerId>,
    },
    /// The open failure is being written.
    Refusing { reply: Bytes },
}

impl AcceptorState {
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.stage, Stage::Idle)
    }
}

fn refuse(peer_channel: u32, reason: OpenFailureReason, description: &str) -> Stage {
    let reply = OpenFailure {
        peer_channel,
        reason,
        description: description.to_string(),
    }
    .encode();
    Stage::Refusing { reply }
}

impl<T: Transport> Session<T> {
    pub(crate) fn run_acceptor(&mut self, kind: AcceptorKind, payload: &[u8]) -> Result<(), SkiffError> {
        let mut state = match kind {
            AcceptorKind::Listener => mem::take(&mut self.listener_acceptor),
            AcceptorKind::X11 => mem::take(&mut self.x11_acceptor),
        };
        let result = self.advance_acceptor(kind, &mut state, payload);
        match kind {
            AcceptorKind::Listener => self.listener_acceptor = state,
            AcceptorKind::X11 => self.x11_acceptor = state,
        }
        result
    }

    fn advance_acceptor(
        &mut self,
        kind: AcceptorKind,
        state: &mut AcceptorState,
        payload: &[u8],
    ) -> Result<(), SkiffError> {
        if state.is_idle() {
            let request = OpenRequest::parse(payload, kind)?;
            state.stage = match kind {
                AcceptorKind::Listener => self.decide_forward(request),
                AcceptorKind::X11 => self.decide_x11(request),
            };
        }

        match &state.stage {
            Stage::Idle => return Ok(()),
            Stage::Refusing { reply } | Stage::Confirming { reply, .. } => {
                self.transport.write(reply)?;
            }
        }

        match mem::take(&mut state.stage) {
            Stage::Confirming {
                channel,
                request,
                listener,
                ..
            } => self.finish_open(channel, request, listener),
            Stage::Idle | Stage::Refusing { .. } => {}
        }
        Ok(())
    }

    fn decide_forward(&mut self, request: OpenRequest) -> Stage {
        let sender = request.sender_channel;
        let refusal = move |reason| refuse(sender, reason, message::FORWARD_NOT_REQUESTED);

        let Some(id) = self.listeners.find(request.host.as_bytes(), request.port) else {
            warn!(
                host = %request.host,
                port = request.port,
                "forwarded connection for a port we are not listening on"
            );
            return refusal(OpenFailureReason::AdministrativelyProhibited);
        };
        if self.listeners.get(id).is_some_and(|l| l.is_full()) {
            warn!(
                host = %request.host,
                port = request.port,
                "listener queue is full, refusing connection"
            );
            return refusal(OpenFailureReason::ResourceShortage);
        }

        let channel = match self.allocate_channel(
            "forwarded-tcpip",
            request.sender_channel,
            request.initial_window,
            request.packet_size,
        ) {
            Ok(channel) => channel,
            Err(e) => {
                warn!("cannot accept forwarded connection: {e}");
                return refusal(OpenFailureReason::ResourceShortage);
            }
        };
        let reply = confirmation(&channel);
        Stage::Confirming {
            reply,
            channel,
            request,
            listener: Some(id),
        }
    }

    fn decide_x11(&mut self, request: OpenRequest) -> Stage {
        let sender = request.sender_channel;
        let refusal = move |reason| refuse(sender, reason, message::X11_FORWARD_UNAVAILABLE);

        if !self.config.x11_forwarding {
            debug!("X11 forwarding disabled, refusing open");
            return refusal(OpenFailureReason::ResourceShortage);
        }
        let channel = match self.allocate_channel(
            "x11",
            request.sender_channel,
            request.initial_window,
            request.packet_size,
        ) {
            Ok(channel) => channel,
            Err(e) => {
                warn!("cannot accept X11 connection: {e}");
                return refusal(OpenFailureReason::ResourceShortage);
            }
        };
        let reply = confirmation(&channel);
        Stage::Confirming {
            reply,
            channel,
            request,
            listener: None,
        }
    }

    /// Hand a confirmed channel to its owner.
    fn finish_open(&mut self, channel: Channel, request: OpenRequest, listener: Option<ListenerId>) {
        let local_id = channel.local_id();
        match listener {
            Some(id) => match self.listeners.get_mut(id) {
                Some(listener) => {
                    info!(
                        local_id,
                        remote_id = channel.remote_id(),
                        origin_host = %request.origin_host,
                        origin_port = request.origin_port,
                        "forwarded connection queued on {}:{}",
                        listener.host(),
                        listener.port()
                    );
                    listener.enqueue(channel);
                }
                None => warn!(local_id, %id, "listener removed before connection was queued"),
            },
            None => {
                info!(
                    local_id,
                    remote_id = channel.remote_id(),
                    "X11 connection from {}:{}",
                    request.host,
                    request.port
                );
                self.channels.insert(channel);
                self.hooks
                    .x11_opened(&mut self.channels, local_id, &request.host, request.port);
            }
        }
    }
}

fn confirmation(channel: &Channel) -> Bytes {
    OpenConfirmation {
        peer_channel: channel.remote_id(),
        local_channel: channel.local_id(),
        window: channel.window().local_window_size,
        packet_size: channel.window().local_packet_size,
    }
    .encode()
}
