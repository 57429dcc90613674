//! Contact collaborator abstraction for `peerchat`.
//!
//! A [`Contact`] is the peer on the other end of a conversation together
//! with the connection used to reach it. The conversation consumes it
//! through a narrow interface: submit a message and get a correlation id
//! back, read the current presence, and subscribe to its event stream.
//!
//! Concrete implementations include:
//! - [`loopback::LoopbackContact`]: in-process contact for tests and the demo

pub mod loopback;

use std::fmt;

use tokio::sync::mpsc;

use peerchat_proto::message::{CorrelationId, IncomingMessage, OutgoingMessage, SendOutcome};
use peerchat_proto::presence::PresenceStatus;

/// Unique identifier for a peer.
///
/// Two contacts are the same peer exactly when their ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a new peer identifier from a string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the string representation of this peer ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notifications a contact pushes to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactEvent {
    /// The peer sent us a message.
    IncomingMessage(IncomingMessage),
    /// The peer's presence changed.
    StatusChanged(PresenceStatus),
    /// A previously submitted message was resolved.
    SendCompleted {
        /// Id returned by [`Contact::submit_message`].
        correlation_id: CorrelationId,
        /// Whether the message reached the peer.
        outcome: SendOutcome,
    },
}

/// Sending half of a contact event stream, handed to [`Contact::subscribe`].
pub type ContactEventSender = mpsc::UnboundedSender<ContactEvent>;

/// Receiving half of a contact event stream.
pub type ContactEvents = mpsc::UnboundedReceiver<ContactEvent>;

/// Registration handle returned by [`Contact::subscribe`].
///
/// Dropping the handle unregisters the event sink.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Creates a handle that runs `release` when dropped.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Creates a handle with nothing to release.
    pub fn detached() -> Self {
        Self { release: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// The peer a conversation is associated with.
///
/// # Invariant
///
/// [`submit_message`](Contact::submit_message) returns without waiting for
/// the outcome. Every id it hands out must eventually be resolved by at most
/// one [`ContactEvent::SendCompleted`] on the subscribed streams, or never.
pub trait Contact {
    /// Opaque connection handle passed back into `submit_message`.
    type Connection;

    /// Identity of the peer.
    fn peer_id(&self) -> &PeerId;

    /// Current presence of the peer.
    fn presence(&self) -> PresenceStatus;

    /// The connection new messages should be submitted on.
    fn connection(&self) -> Self::Connection;

    /// Submit a message and return the id its completion will carry.
    fn submit_message(
        &self,
        connection: &Self::Connection,
        message: OutgoingMessage,
    ) -> CorrelationId;

    /// Register `events` to receive this contact's notifications until the
    /// returned [`Subscription`] is dropped.
    fn subscribe(&self, events: ContactEventSender) -> Subscription;
}
