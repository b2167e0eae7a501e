//! Connection lifecycle as seen by the dispatcher.
//!
//! Provides a `ConnectionPhase` enum with validated transitions that
//! return `Result` instead of panicking.

use std::time::Instant;

use crate::error::SkiffError;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of a connection.
///
/// ```text
///  Handshaking ──► Connected ◄──► Rekeying
///       │              │             │
///       ▼              ▼             ▼
///       └──────► Disconnected ◄──────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// Initial key exchange in progress.
    #[default]
    Handshaking,

    /// Keys established; ordinary traffic flows.
    Connected {
        /// When the connection last entered the `Connected` state.
        since: Instant,
    },

    /// A key re-exchange was triggered and has not finished.
    Rekeying,

    /// The peer disconnected or the socket died. Terminal.
    Disconnected,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Rekeying => write!(f, "Rekeying"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Whether a key exchange (initial or repeated) is under way.
    pub fn is_exchanging_keys(&self) -> bool {
        matches!(self, Self::Handshaking | Self::Rekeying)
    }

    /// How long the connection has been in the `Connected` state.
    ///
    /// Returns `None` for any other phase.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connected`.
    ///
    /// Valid from: `Handshaking`, `Rekeying`.
    pub fn complete_handshake(&mut self) -> Result<(), SkiffError> {
        match self {
            Self::Handshaking | Self::Rekeying => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(SkiffError::ProtocolViolation(
                "cannot complete handshake: no key exchange in progress",
            )),
        }
    }

    /// Transition to `Rekeying`.
    ///
    /// Valid from: `Connected`.
    pub fn begin_rekey(&mut self) -> Result<(), SkiffError> {
        match self {
            Self::Connected { .. } => {
                *self = Self::Rekeying;
                Ok(())
            }
            _ => Err(SkiffError::ProtocolViolation(
                "cannot rekey: not in Connected state",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────
