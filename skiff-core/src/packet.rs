//! Queued incoming messages.

use bytes::Bytes;

/// Outcome of the transport's integrity check for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacStatus {
    /// The MAC matched.
    #[default]
    Ok,
    /// The MAC did not match.
    Invalid,
    /// The MAC did not match but the application accepted the message.
    ConfirmedDespiteMismatch,
}

/// A classified message waiting in the brigade.
///
/// `payload` always begins with the type octet. For channel data the
/// payload may have been truncated to what the receive window allowed.
#[derive(Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    payload: Bytes,
    header_skip: usize,
    mac: MacStatus,
}

impl IncomingMessage {
    pub fn new(payload: Bytes, header_skip: usize, mac: MacStatus) -> Self {
        let header_skip = header_skip.min(payload.len());
        Self {
            payload,
            header_skip,
            mac,
        }
    }

    /// The message-type octet (0 for an empty payload).
    pub fn message_type(&self) -> u8 {
        self.payload.first().copied().unwrap_or(0)
    }

    /// The full payload including the type octet.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Bytes preceding the data proper.
    pub fn header_skip(&self) -> usize {
        self.header_skip
    }

    /// The data past `header_skip`.
    pub fn data(&self) -> &[u8] {
        &self.payload[self.header_skip..]
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn mac_status(&self) -> MacStatus {
        self.mac
    }

    /// Whether `filter` (if any) matches this payload.
    pub fn matches(&self, filter: Option<&PayloadMatch>) -> bool {
        match filter {
            None => true,
            Some(m) => m.matches(&self.payload),
        }
    }
}

impl std::fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("type", &self.message_type())
            .field("len", &self.payload.len())
            .field("header_skip", &self.header_skip)
            .field("mac", &self.mac)
            .finish()
    }
}

// ── PayloadMatch ─────────────────────────────────────────────────

/// Byte-range equality filter applied at a fixed payload offset.
///
/// Used to pick the reply for one channel out of the brigade, e.g.
/// the open confirmation whose recipient id matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMatch {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl PayloadMatch {
    pub fn new(offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            bytes: bytes.into(),
        }
    }

    /// Match a big-endian `u32` at `offset`, the common case of a channel id.
    pub fn u32_at(offset: usize, value: u32) -> Self {
        Self::new(offset, value.to_be_bytes().to_vec())
    }

    pub fn matches(&self, payload: &[u8]) -> bool {
        payload
            .get(self.offset..)
            .is_some_and(|rest| rest.starts_with(&self.bytes))
    }
}
