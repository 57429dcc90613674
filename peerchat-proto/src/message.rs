//! Message-level types shared between a conversation and its contact.
//!
//! These types describe what a conversation stores and what it exchanges
//! with the contact collaborator. The wire encoding of chat messages is the
//! contact's concern; nothing here is tied to a particular protocol.

use serde::{Deserialize, Serialize};

/// 16-bit identifier correlating a message with its asynchronous reply.
///
/// Outgoing ids are assigned by the contact when a message is submitted.
/// Incoming ids are assigned by the remote peer. The two id-spaces overlap,
/// so an id is only meaningful together with the direction of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorrelationId(u16);

impl CorrelationId {
    /// Creates a correlation id from its raw value.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Interprets a raw prior-message marker, where `0` means "unknown".
    #[must_use]
    pub const fn from_marker(raw: u16) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    /// Returns the raw 16-bit value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Returns the id following this one, wrapping around and skipping `0`.
    #[must_use]
    pub const fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            0 => Self(1),
            n => Self(n),
        }
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Signed number of milliseconds from `earlier` to `self`.
    ///
    /// Negative when `earlier` is actually the later of the two, which
    /// happens once incoming messages have been reordered.
    #[must_use]
    pub fn millis_since(&self, earlier: Self) -> i64 {
        let diff = i128::from(self.0) - i128::from(earlier.0);
        i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Lifecycle of a message in a conversation.
///
/// `Received` marks messages that came from the peer. Every other status
/// is a phase of an outgoing message: `Sending` until the contact reports
/// the outcome, then `Delivered` or `Error`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Message came from the peer.
    Received,
    /// Submitted, outcome not yet known.
    Sending,
    /// The contact reported successful delivery.
    Delivered,
    /// The contact reported a delivery failure.
    Error,
}

impl MessageStatus {
    /// Whether this status belongs to a message we sent.
    #[must_use]
    pub const fn is_outgoing(self) -> bool {
        !matches!(self, Self::Received)
    }

    /// Whether this status proves the peer was reachable: something
    /// arrived from it, or it acknowledged something of ours.
    #[must_use]
    pub const fn confirms_peer(self) -> bool {
        matches!(self, Self::Received | Self::Delivered)
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Sending)
    }

    /// Display symbol for this status.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Received => " ",
            Self::Sending => "\u{22ef}",
            Self::Delivered => "\u{2713}",
            Self::Error => "\u{2717}",
        }
    }
}

impl From<SendOutcome> for MessageStatus {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Delivered => Self::Delivered,
            SendOutcome::Failed => Self::Error,
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Sending => write!(f, "sending"),
            Self::Delivered => write!(f, "delivered"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Final result of a submitted message, reported asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendOutcome {
    /// The peer accepted the message.
    Delivered,
    /// The message could not be delivered.
    Failed,
}

impl SendOutcome {
    /// Maps a success flag to an outcome.
    #[must_use]
    pub const fn from_success(success: bool) -> Self {
        if success { Self::Delivered } else { Self::Failed }
    }
}

/// A message handed to the contact for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Message text, as typed.
    pub text: String,
    /// When the message was sent.
    pub timestamp: Timestamp,
    /// Id of the last message we received, so the peer can anchor this one.
    pub last_received_id: Option<CorrelationId>,
}

/// A message delivered by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Message text, untrimmed.
    pub text: String,
    /// When the peer sent the message.
    pub timestamp: Timestamp,
    /// Id assigned by the peer.
    pub message_id: CorrelationId,
    /// Id of the last message the peer had seen from us, if known.
    pub prior_message_id: Option<CorrelationId>,
}
