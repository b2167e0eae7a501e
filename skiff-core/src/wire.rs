//! Bounds-checked wire primitives and reply encoders.
//!
//! ## Wire format
//!
//! Every payload starts with its message-type octet. Integers are
//! unsigned 32-bit big-endian. Strings are a `u32` length followed by
//! raw bytes with no terminator.
//!
//! **Open confirmation** (17 bytes):
//! ```text
//! type:           u8   (1)   = 91
//! peer_channel:   u32  (4)
//! local_channel:  u32  (4)
//! window:         u32  (4)
//! packet_size:    u32  (4)
//! ```
//!
//! **Open failure** (17 bytes + description):
//! ```text
//! type:           u8      (1)   = 92
//! peer_channel:   u32     (4)
//! reason:         u32     (4)
//! description:    string  (4 + n)
//! language:       string  (4)   always empty
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::SkiffError;
use crate::message::{MessageType, OpenFailureReason};

// ── WireReader ───────────────────────────────────────────────────

/// Cursor over a received payload.
///
/// Strings are returned as sub-slices of the payload; nothing is
/// copied and the payload is never modified.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Start reading at `offset` (e.g. past the type octet).
    pub fn at(buf: &'a [u8], offset: usize) -> Result<Self, SkiffError> {
        if offset > buf.len() {
            return Err(SkiffError::Truncated {
                needed: offset,
                available: buf.len(),
            });
        }
        Ok(Self { buf, pos: offset })
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SkiffError> {
        let end = self.pos.checked_add(n).ok_or(SkiffError::ProtocolViolation(
            "length field overflows",
        ))?;
        if end > self.buf.len() {
            return Err(SkiffError::Truncated {
                needed: end,
                available: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, SkiffError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, SkiffError> {
        Ok(self.u8()? != 0)
    }

    pub fn u32(&mut self) -> Result<u32, SkiffError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// A length-prefixed string, as a view into the payload.
    pub fn string(&mut self) -> Result<&'a [u8], SkiffError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// A length-prefixed string decoded lossily for callbacks and logs.
    pub fn text(&mut self) -> Result<String, SkiffError> {
        Ok(String::from_utf8_lossy(self.string()?).into_owned())
    }
}

// ── Writers ──────────────────────────────────────────────────────

pub fn put_string(buf: &mut BytesMut, s: &[u8]) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s);
}

// ── OpenConfirmation ─────────────────────────────────────────────

/// Reply accepting a peer-initiated channel open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenConfirmation {
    pub peer_channel: u32,
    pub local_channel: u32,
    pub window: u32,
    pub packet_size: u32,
}

impl OpenConfirmation {
    /// Encoded size on the wire.
    pub const SIZE: usize = 17;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(MessageType::ChannelOpenConfirmation.code());
        buf.put_u32(self.peer_channel);
        buf.put_u32(self.local_channel);
        buf.put_u32(self.window);
        buf.put_u32(self.packet_size);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, SkiffError> {
        if data.len() < Self::SIZE {
            return Err(SkiffError::Truncated {
                needed: Self::SIZE,
                available: data.len(),
            });
        }
        let mut r = WireReader::new(data);
        if r.u8()? != MessageType::ChannelOpenConfirmation.code() {
            return Err(SkiffError::ProtocolViolation(
                "not an open confirmation",
            ));
        }
        Ok(Self {
            peer_channel: r.u32()?,
            local_channel: r.u32()?,
            window: r.u32()?,
            packet_size: r.u32()?,
        })
    }
}

// ── OpenFailure ──────────────────────────────────────────────────

/// Reply refusing a peer-initiated channel open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFailure {
    pub peer_channel: u32,
    pub reason: OpenFailureReason,
    pub description: String,
}

impl OpenFailure {
    /// Fixed part: type, channel, reason and the two string lengths.
    pub const FIXED_SIZE: usize = 17;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::FIXED_SIZE + self.description.len());
        buf.put_u8(MessageType::ChannelOpenFailure.code());
        buf.put_u32(self.peer_channel);
        buf.put_u32(self.reason.code());
        put_string(&mut buf, self.description.as_bytes());
        put_string(&mut buf, b"");
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, SkiffError> {
        let mut r = WireReader::new(data);
        if r.u8()? != MessageType::ChannelOpenFailure.code() {
            return Err(SkiffError::ProtocolViolation("not an open failure"));
        }
        let peer_channel = r.u32()?;
        let reason = OpenFailureReason::try_from(r.u32()?)?;
        let description = r.text()?;
        Ok(Self {
            peer_channel,
            reason,
            description,
        })
    }
}

// ── Small replies ────────────────────────────────────────────────

const REQUEST_FAILURE: &[u8] = &[MessageType::RequestFailure.code()];

/// Global request refusal: the bare type octet.
pub fn request_failure() -> Bytes {
    Bytes::from_static(REQUEST_FAILURE)
}

/// Channel request refusal addressed to `peer_channel`.
pub fn channel_failure(peer_channel: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(MessageType::ChannelFailure.code());
    buf.put_u32(peer_channel);
    buf.freeze()
}

/// Receive-window top-up granted to `peer_channel`.
pub fn window_adjust(peer_channel: u32, bytes_to_add: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(MessageType::ChannelWindowAdjust.code());
    buf.put_u32(peer_channel);
    buf.put_u32(bytes_to_add);
    buf.freeze()
}
