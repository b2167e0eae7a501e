//! Application callbacks invoked by the dispatcher.
//!
//! Every method has a no-op default, so an application only overrides
//! what it cares about.

use crate::channel::ChannelSet;

pub trait SessionHooks {
    /// The peer sent a disconnect message.
    fn disconnect(&mut self, _reason: u32, _message: &str, _language: &str) {}

    /// The peer sent an ignore message.
    fn ignore(&mut self, _data: &[u8]) {}

    /// The peer sent a debug message.
    fn debug(&mut self, _always_display: bool, _message: &str, _language: &str) {}

    /// A message failed its integrity check.
    ///
    /// Return `true` to process it anyway.
    fn integrity_failure(&mut self, _payload: &[u8]) -> bool {
        false
    }

    /// A forwarded X11 connection was accepted as channel `local_id`.
    ///
    /// The channel is already linked into `channels`; the hook may take
    /// it out and drop it.
    fn x11_opened(&mut self, _channels: &mut ChannelSet, _local_id: u32, _host: &str, _port: u32) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl SessionHooks for NoHooks {}
