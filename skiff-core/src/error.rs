//! Domain-specific error types for the skiff dispatch engine.
//!
//! All fallible operations return `Result<T, SkiffError>`.
//! `WouldBlock` is not a failure: it tells the caller to invoke the
//! same operation again once the transport is ready.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the skiff engine.
#[derive(Debug, Error)]
pub enum SkiffError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A message violated protocol framing rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A length field pointed past the end of the message.
    #[error("truncated message: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The message failed its integrity check and no override was given.
    #[error("invalid MAC received")]
    InvalidIntegrityCheck,

    /// A message referenced a channel that does not exist.
    #[error("message for unknown channel {0}")]
    UnknownChannel(u32),

    /// A channel or reply buffer could not be allocated.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(&'static str),

    /// The key-exchange collaborator reported a failure.
    #[error("key exchange failed: {0}")]
    KeyExchange(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The transport cannot make progress right now; retry later with
    /// identical inputs.
    #[error("operation would block")]
    WouldBlock,

    /// A wait exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The peer disconnected or the socket is closed.
    #[error("peer disconnected")]
    PeerDisconnected,

    /// The transport layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    // ── Configuration Errors ─────────────────────────────────────
    /// A configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl SkiffError {
    /// Returns `true` for the resumption signal rather than a real failure.
    pub fn is_would_block(&self) -> bool {
        matches!(self, SkiffError::WouldBlock)
    }

    /// Returns `true` when the connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SkiffError::InvalidIntegrityCheck
                | SkiffError::PeerDisconnected
                | SkiffError::Transport(_)
                | SkiffError::KeyExchange(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for SkiffError {
    fn from(s: String) -> Self {
        SkiffError::Other(s)
    }
}

impl From<&str> for SkiffError {
    fn from(s: &str) -> Self {
        SkiffError::Other(s.to_string())
    }
}

impl From<toml::de::Error> for SkiffError {
    fn from(e: toml::de::Error) -> Self {
        SkiffError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = SkiffError::InvalidIntegrityCheck;
        assert!(e.to_string().contains("MAC"));

        let e = SkiffError::Truncated {
            needed: 13,
            available: 9,
        };
        assert!(e.to_string().contains("13"));
        assert!(e.to_string().contains("9"));
    }

    #[test]
    fn would_block_is_not_fatal() {
        assert!(SkiffError::WouldBlock.is_would_block());
        assert!(!SkiffError::WouldBlock.is_fatal());
        assert!(SkiffError::PeerDisconnected.is_fatal());
        assert!(!SkiffError::UnknownChannel(3).is_fatal());
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: SkiffError = io_err.into();
        assert!(matches!(e, SkiffError::Transport(_)));
        assert!(e.is_fatal());
    }

    #[test]
    fn from_string() {
        let e: SkiffError = "something broke".into();
        assert!(matches!(e, SkiffError::Other(_)));
    }
}
