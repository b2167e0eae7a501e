//! The brigade: classified messages awaiting pickup by upper layers.
//!
//! Insertion order is arrival order. Lookups are linear scans by type
//! and optional payload filter; removal keeps the relative order of the
//! remaining entries.

use std::collections::VecDeque;

use crate::packet::{IncomingMessage, PayloadMatch};

#[derive(Debug, Default)]
pub struct Brigade {
    entries: VecDeque<IncomingMessage>,
}

impl Brigade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message; it becomes the newest entry.
    pub fn push(&mut self, msg: IncomingMessage) {
        self.entries.push_back(msg);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IncomingMessage> {
        self.entries.iter()
    }

    fn position(&self, message_type: u8, filter: Option<&PayloadMatch>) -> Option<usize> {
        self.entries
            .iter()
            .position(|m| m.message_type() == message_type && m.matches(filter))
    }

    /// Remove and return the oldest message of `message_type` matching `filter`.
    pub fn take(
        &mut self,
        message_type: u8,
        filter: Option<&PayloadMatch>,
    ) -> Option<IncomingMessage> {
        let idx = self.position(message_type, filter)?;
        self.entries.remove(idx)
    }

    /// Try each type in `types`, in order, returning the first hit.
    pub fn take_any(
        &mut self,
        types: &[u8],
        filter: Option<&PayloadMatch>,
    ) -> Option<IncomingMessage> {
        types.iter().find_map(|&ty| self.take(ty, filter))
    }

    /// Remove and return the oldest message of any type.
    pub fn pop_oldest(&mut self) -> Option<IncomingMessage> {
        self.entries.pop_front()
    }
}
