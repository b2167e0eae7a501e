//! # skiff-core
//!
//! Incoming-message dispatch engine for an SSH-style secure transport.
//!
//! This crate contains:
//! - **Dispatch**: classification of decrypted messages and the protocol
//!   reactions that cannot wait (flow control, teardown, forwarded and
//!   X11 channel opens), resumable across `WouldBlock`
//! - **Brigade**: the queue of messages awaiting upper layers
//! - **Wait**: fetch and timed-wait entry points over the brigade
//! - **Channels and listeners**: window ledger and pending-connection queues
//! - **State**: connection phase and resumption markers
//! - **Transport**: the lower-layer seam, plus an in-memory scripted transport
//! - **Error**: `SkiffError`, a `thiserror`-based error enum

pub mod brigade;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod listener;
pub mod message;
pub mod packet;
pub mod retry;
pub mod session;
pub mod state;
pub mod transport;
pub mod wait;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use brigade::Brigade;
pub use channel::{Channel, ChannelSet, ChannelWindow, ExtendedDataMode};
pub use config::SessionConfig;
pub use dispatch::{AcceptorKind, AcceptorState, OpenRequest};
pub use error::SkiffError;
pub use hooks::{NoHooks, SessionHooks};
pub use listener::{Listener, ListenerId, ListenerSet};
pub use message::{MessageType, OpenFailureReason};
pub use packet::{IncomingMessage, MacStatus, PayloadMatch};
pub use session::{KeyExchange, Session};
pub use state::{ConnectionPhase, DispatchProgress, WaitDeadline};
pub use transport::{RawPacket, ReadEvent, ScriptedTransport, Transport};
