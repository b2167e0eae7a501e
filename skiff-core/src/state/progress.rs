//! Resumption markers that survive a `WouldBlock` return.

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::dispatch::AcceptorKind;

/// Where the dispatcher stopped inside the handling of one message.
///
/// ```text
///  Idle ──► Classified ──┬──► Replying ─────┐
///                        ├──► Accepting ────┤
///                        └──► Queued ───────┴──► Idle
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DispatchProgress {
    /// No message in flight.
    #[default]
    Idle,
    /// Integrity checked, classification pending.
    Classified,
    /// A protocol reply (request failure, window refund) is being written.
    Replying(Bytes),
    /// An acceptor owns the rest of the handling.
    Accepting(AcceptorKind),
    /// The message is in the brigade; only the rekey check remains.
    Queued,
}

impl DispatchProgress {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Start time of one timed wait.
///
/// Set on the first suspension of a wait and cleared when the wait
/// completes, fails or times out, so the timeout covers the whole wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitDeadline {
    started: Option<Instant>,
}

impl WaitDeadline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start time unless already set.
    pub fn start(&mut self) -> Instant {
        *self.started.get_or_insert_with(Instant::now)
    }

    pub fn is_set(&self) -> bool {
        self.started.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    pub fn has_expired(&self, timeout: Duration) -> bool {
        self.is_set() && self.elapsed() >= timeout
    }

    pub fn reset(&mut self) {
        self.started = None;
    }
}
