//! Packet traces and their replay through a scripted session.
//!
//! A trace is a TOML file:
//!
//! ```toml
//! write_stalls = 2
//!
//! [[channel]]
//! local_id = 0
//! remote_id = 7
//! window = 150
//!
//! [[listener]]
//! host = "localhost"
//! port = 8080
//!
//! [[packet]]
//! bytes = [96, 0, 0, 0, 0]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use skiff_core::{
    Channel, ChannelWindow, ExtendedDataMode, Listener, ScriptedTransport, Session,
    SessionConfig, SkiffError, retry,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Trace {
    /// Start the session with keys already established.
    pub connected: bool,
    /// Reply writes that return `WouldBlock` before any succeeds.
    pub write_stalls: usize,
    pub channel: Vec<TraceChannel>,
    pub listener: Vec<TraceListener>,
    pub packet: Vec<TracePacket>,
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            connected: true,
            write_stalls: 0,
            channel: Vec::new(),
            listener: Vec::new(),
            packet: Vec::new(),
        }
    }
}

/// A channel linked before the replay starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceChannel {
    pub local_id: u32,
    pub remote_id: u32,
    /// Receive window.
    pub window: u32,
    #[serde(default = "default_packet_size")]
    pub packet_size: u32,
    #[serde(default)]
    pub ignore_extended: bool,
}

fn default_packet_size() -> u32 {
    32768
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceListener {
    pub host: String,
    pub port: u32,
    #[serde(default)]
    pub queue_max: usize,
}

/// One decrypted payload handed to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracePacket {
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub bad_mac: bool,
}

impl Trace {
    pub fn from_toml_str(text: &str) -> Result<Self, SkiffError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, SkiffError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SkiffError::Config(format!("cannot read trace {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Build a session with the trace's channels, listeners and script.
    pub fn build_session(&self, config: SessionConfig) -> Result<Session<ScriptedTransport>, SkiffError> {
        let mut transport = ScriptedTransport::new();
        for packet in &self.packet {
            if packet.bad_mac {
                transport.push_bad_mac(packet.bytes.clone());
            } else {
                transport.push_packet(packet.bytes.clone());
            }
        }
        transport.stall_writes(self.write_stalls);

        let mut session = Session::new(transport, config);
        if self.connected {
            session.phase_mut().complete_handshake()?;
        }
        for ch in &self.channel {
            let mode = if ch.ignore_extended {
                ExtendedDataMode::Ignore
            } else {
                ExtendedDataMode::Normal
            };
            let window = ChannelWindow::new(ch.window, ch.packet_size, 0, ch.packet_size);
            session
                .channels_mut()
                .insert(Channel::new("session", ch.local_id, ch.remote_id, window).with_extended_data(mode));
        }
        for l in &self.listener {
            session
                .listeners_mut()
                .add(Listener::new(l.host.clone(), l.port, l.queue_max));
        }
        Ok(session)
    }
}

/// What a replay did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Type octets of messages dispatched successfully, in order.
    pub dispatched: Vec<u8>,
    /// Messages rejected with a recoverable error.
    pub rejected: usize,
    /// Write attempts that blocked and were retried.
    pub retries: usize,
    /// Replies written to the peer.
    pub replies: usize,
    /// Type octets left in the brigade.
    pub queued: Vec<u8>,
    pub disconnected: bool,
}

/// Feed every packet of `trace` through a fresh session.
pub fn run(trace: &Trace, config: SessionConfig) -> Result<ReplayReport, SkiffError> {
    let mut session = trace.build_session(config)?;
    let mut report = ReplayReport::default();

    loop {
        let outcome = retry::block_on(|| session.pump(), || report.retries += 1);
        match outcome {
            Ok(Some(message_type)) => {
                debug!(message_type, "dispatched");
                report.dispatched.push(message_type);
            }
            Ok(None) => break,
            Err(SkiffError::PeerDisconnected) => {
                info!("peer disconnected; replay stops");
                break;
            }
            Err(e) if e.is_fatal() => {
                warn!("fatal dispatch error: {e}");
                break;
            }
            Err(e) => {
                warn!("message rejected: {e}");
                report.rejected += 1;
            }
        }
    }

    for msg in session.brigade().iter() {
        info!(
            message_type = msg.message_type(),
            len = msg.len(),
            data = msg.data().len(),
            mac = ?msg.mac_status(),
            "queued"
        );
    }
    for ch in session.channels().iter() {
        let w = ch.window();
        info!(
            local_id = ch.local_id(),
            remote_id = ch.remote_id(),
            local_window = w.local_window_size,
            remote_window = w.remote_window_size,
            eof = ch.remote_eof(),
            close = ch.remote_close(),
            exit_status = ?ch.exit_status(),
            "channel"
        );
    }
    for l in session.listeners().iter() {
        info!(
            host = l.host(),
            port = l.port(),
            pending = l.queue_size(),
            queue_max = l.queue_max(),
            "listener"
        );
    }
    if let Some(uptime) = session.phase().connected_duration() {
        info!(?uptime, "session connected");
    }

    report.replies = session.transport().written().len();
    report.queued = session.brigade().iter().map(|m| m.message_type()).collect();
    report.disconnected = session.is_disconnected();
    Ok(report)
}
