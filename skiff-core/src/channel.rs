//! Channel records and the per-connection channel set.
//!
//! The dispatcher reads and mutates the flow-control ledger of each
//! channel: the receive direction (`local_*`, how much the peer may
//! still send us) and the send direction (`remote_*`, how much we may
//! still send the peer).

use std::collections::BTreeMap;

use crate::error::SkiffError;

// ── ChannelWindow ────────────────────────────────────────────────

/// Flow-control ledger of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWindow {
    /// Bytes the peer may still send before we top the window up.
    pub local_window_size: u32,
    /// Window we advertised when the channel opened.
    pub local_window_size_initial: u32,
    /// Largest data payload we accept in one message.
    pub local_packet_size: u32,
    /// Bytes we may still send the peer.
    pub remote_window_size: u32,
    /// Largest data payload the peer accepts in one message.
    pub remote_packet_size: u32,
}

impl ChannelWindow {
    /// A ledger with `local` receive values and `remote` send values.
    pub fn new(local_window: u32, local_packet: u32, remote_window: u32, remote_packet: u32) -> Self {
        Self {
            local_window_size: local_window,
            local_window_size_initial: local_window,
            local_packet_size: local_packet,
            remote_window_size: remote_window,
            remote_packet_size: remote_packet,
        }
    }

    /// How many of `len` data bytes the receive window can take right now.
    pub fn admissible(&self, len: usize) -> u32 {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        len.min(self.local_packet_size).min(self.local_window_size)
    }

    /// Charge an incoming payload of `len` bytes against the receive window.
    ///
    /// Returns the number of bytes kept; the rest must be dropped.
    pub fn consume(&mut self, len: usize) -> u32 {
        let kept = self.admissible(len);
        self.local_window_size -= kept;
        kept
    }

    /// Top up the send window after a peer window adjust.
    pub fn grant(&mut self, bytes: u32) {
        self.remote_window_size = self.remote_window_size.saturating_add(bytes);
    }

    pub fn is_exhausted(&self) -> bool {
        self.local_window_size == 0
    }
}

// ── ExtendedDataMode ─────────────────────────────────────────────

/// How extended (stderr) data on a channel is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtendedDataMode {
    /// Queue it like ordinary data.
    #[default]
    Normal,
    /// Drop it and refund the window to the peer.
    Ignore,
    /// Queue it; upper layers merge it into the data stream.
    Merge,
}

// ── Channel ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    channel_type: String,
    local_id: u32,
    remote_id: u32,
    window: ChannelWindow,
    extended_data: ExtendedDataMode,
    remote_eof: bool,
    remote_close: bool,
    exit_status: Option<u32>,
}

impl Channel {
    pub fn new(
        channel_type: impl Into<String>,
        local_id: u32,
        remote_id: u32,
        window: ChannelWindow,
    ) -> Self {
        Self {
            channel_type: channel_type.into(),
            local_id,
            remote_id,
            window,
            extended_data: ExtendedDataMode::default(),
            remote_eof: false,
            remote_close: false,
            exit_status: None,
        }
    }

    pub fn with_extended_data(mut self, mode: ExtendedDataMode) -> Self {
        self.extended_data = mode;
        self
    }

    pub fn channel_type(&self) -> &str {
        &self.channel_type
    }

    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    pub fn remote_id(&self) -> u32 {
        self.remote_id
    }

    pub fn window(&self) -> &ChannelWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut ChannelWindow {
        &mut self.window
    }

    pub fn extended_data(&self) -> ExtendedDataMode {
        self.extended_data
    }

    pub fn remote_eof(&self) -> bool {
        self.remote_eof
    }

    pub fn set_remote_eof(&mut self, eof: bool) {
        self.remote_eof = eof;
    }

    pub fn remote_close(&self) -> bool {
        self.remote_close
    }

    /// Peer closed the channel; a close implies EOF.
    pub fn mark_remote_close(&mut self) {
        self.remote_close = true;
        self.remote_eof = true;
    }

    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    pub fn set_exit_status(&mut self, status: u32) {
        self.exit_status = Some(status);
    }
}

// ── ChannelSet ───────────────────────────────────────────────────

/// Channels linked into one connection, keyed by local id.
#[derive(Debug, Default)]
pub struct ChannelSet {
    channels: BTreeMap<u32, Channel>,
    next_id: u32,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locate(&self, local_id: u32) -> Option<&Channel> {
        self.channels.get(&local_id)
    }

    pub fn locate_mut(&mut self, local_id: u32) -> Option<&mut Channel> {
        self.channels.get_mut(&local_id)
    }

    /// Like [`locate_mut`](Self::locate_mut), for messages that must
    /// name a linked channel.
    pub fn locate_known(&mut self, local_id: u32) -> Result<&mut Channel, SkiffError> {
        self.channels
            .get_mut(&local_id)
            .ok_or(SkiffError::UnknownChannel(local_id))
    }

    /// Link a channel, replacing any previous channel with the same id.
    pub fn insert(&mut self, channel: Channel) -> Option<Channel> {
        self.channels.insert(channel.local_id(), channel)
    }

    pub fn remove(&mut self, local_id: u32) -> Option<Channel> {
        self.channels.remove(&local_id)
    }

    /// Next unused local id. Ids are handed out in increasing order
    /// and skip ids still linked.
    pub fn next_local_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if !self.channels.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }
}
