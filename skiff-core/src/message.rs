//! Message types and reason codes of the secure-shell transport.
//!
//! Uses proper enums with `TryFrom`, so unknown values never panic. The
//! brigade stores the raw type octet so that types this crate does not
//! name can still be queued for upper layers.

use crate::error::SkiffError;
use std::fmt;

// ── Protocol names ───────────────────────────────────────────────

/// Channel type of a connection forwarded from a remote listener.
pub const FORWARDED_TCPIP: &[u8] = b"forwarded-tcpip";

/// Channel type of a forwarded X11 connection.
pub const X11: &[u8] = b"x11";

/// Channel request carrying the remote process exit status.
pub const EXIT_STATUS: &[u8] = b"exit-status";

/// Description sent when a forwarded connection has no listener.
pub const FORWARD_NOT_REQUESTED: &str = "Forward not requested";

/// Description sent when an X11 connection cannot be accepted.
pub const X11_FORWARD_UNAVAILABLE: &str = "X11 Forward Unavailable";

/// Disconnect reason reported locally when a MAC check fails.
pub const DISCONNECT_MAC_ERROR: u32 = 5;

// ── MessageType ──────────────────────────────────────────────────

/// All message types the dispatcher and its callers refer to by name.
///
/// Organized by range:
/// - `1..=19`   Transport layer generic
/// - `20..=49`  Key exchange
/// - `50..=79`  User authentication
/// - `80..=127` Connection protocol
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // ── Transport (1..19) ────────────────────────────────────────
    Disconnect = 1,
    Ignore = 2,
    Unimplemented = 3,
    Debug = 4,
    ServiceRequest = 5,
    ServiceAccept = 6,

    // ── Key exchange (20..49) ────────────────────────────────────
    KexInit = 20,
    NewKeys = 21,
    KexDhInit = 30,
    KexDhReply = 31,

    // ── User authentication (50..79) ─────────────────────────────
    UserauthRequest = 50,
    UserauthFailure = 51,
    UserauthSuccess = 52,
    UserauthBanner = 53,

    // ── Connection (80..127) ─────────────────────────────────────
    GlobalRequest = 80,
    RequestSuccess = 81,
    RequestFailure = 82,
    ChannelOpen = 90,
    ChannelOpenConfirmation = 91,
    ChannelOpenFailure = 92,
    ChannelWindowAdjust = 93,
    ChannelData = 94,
    ChannelExtendedData = 95,
    ChannelEof = 96,
    ChannelClose = 97,
    ChannelRequest = 98,
    ChannelSuccess = 99,
    ChannelFailure = 100,
}

impl MessageType {
    /// The type octet as it appears on the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl From<MessageType> for u8 {
    fn from(ty: MessageType) -> Self {
        ty.code()
    }
}

impl TryFrom<u8> for MessageType {
    type Error = SkiffError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Disconnect),
            2 => Ok(MessageType::Ignore),
            3 => Ok(MessageType::Unimplemented),
            4 => Ok(MessageType::Debug),
            5 => Ok(MessageType::ServiceRequest),
            6 => Ok(MessageType::ServiceAccept),

            20 => Ok(MessageType::KexInit),
            21 => Ok(MessageType::NewKeys),
            30 => Ok(MessageType::KexDhInit),
            31 => Ok(MessageType::KexDhReply),

            50 => Ok(MessageType::UserauthRequest),
            51 => Ok(MessageType::UserauthFailure),
            52 => Ok(MessageType::UserauthSuccess),
            53 => Ok(MessageType::UserauthBanner),

            80 => Ok(MessageType::GlobalRequest),
            81 => Ok(MessageType::RequestSuccess),
            82 => Ok(MessageType::RequestFailure),
            90 => Ok(MessageType::ChannelOpen),
            91 => Ok(MessageType::ChannelOpenConfirmation),
            92 => Ok(MessageType::ChannelOpenFailure),
            93 => Ok(MessageType::ChannelWindowAdjust),
            94 => Ok(MessageType::ChannelData),
            95 => Ok(MessageType::ChannelExtendedData),
            96 => Ok(MessageType::ChannelEof),
            97 => Ok(MessageType::ChannelClose),
            98 => Ok(MessageType::ChannelRequest),
            99 => Ok(MessageType::ChannelSuccess),
            100 => Ok(MessageType::ChannelFailure),

            _ => Err(SkiffError::UnknownVariant {
                type_name: "MessageType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── OpenFailureReason ────────────────────────────────────────────

/// Reason code carried by a channel open-failure reply.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenFailureReason {
    AdministrativelyProhibited = 1,
    ConnectFailed = 2,
    UnknownChannelType = 3,
    ResourceShortage = 4,
}

impl OpenFailureReason {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for OpenFailureReason {
    type Error = SkiffError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OpenFailureReason::AdministrativelyProhibited),
            2 => Ok(OpenFailureReason::ConnectFailed),
            3 => Ok(OpenFailureReason::UnknownChannelType),
            4 => Ok(OpenFailureReason::ResourceShortage),
            _ => Err(SkiffError::UnknownVariant {
                type_name: "OpenFailureReason",
                value: value as u64,
            }),
        }
    }
}
