//! Loopback contact for testing and the demo binary.
//!
//! A [`LoopbackContact`] holds submitted messages in flight until the test
//! (or the demo's simulated peer) resolves them with
//! [`complete_next`](LoopbackContact::complete_next). Two endpoints created
//! with [`LoopbackContact::create_pair`] are linked: a message delivered on
//! one shows up as an incoming message on the other, carrying the sender's
//! last-received id as its prior-message marker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use peerchat_proto::message::{CorrelationId, IncomingMessage, OutgoingMessage, SendOutcome};
use peerchat_proto::presence::PresenceStatus;

use super::{Contact, ContactEvent, ContactEventSender, PeerId, Subscription};

/// A message submitted through a [`LoopbackContact`] and not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedMessage {
    /// Id handed back to the submitter.
    pub correlation_id: CorrelationId,
    /// What was submitted.
    pub message: OutgoingMessage,
}

/// Connection handle of a loopback contact: the linked remote endpoint,
/// if any, at the time of submission.
#[derive(Debug, Clone, Default)]
pub struct LoopbackConnection {
    remote: Weak<Endpoint>,
}

impl LoopbackConnection {
    /// Whether messages on this connection reach another conversation.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.remote.strong_count() > 0
    }
}

/// Shared state behind a [`LoopbackContact`].
#[derive(Debug)]
struct Endpoint {
    /// Identity this endpoint presents to its subscribers.
    peer_id: PeerId,
    /// Presence reported to subscribers.
    presence: Mutex<PresenceStatus>,
    /// Registered event sinks, keyed by registration number.
    subscribers: Mutex<Vec<(u64, ContactEventSender)>>,
    /// Source of registration numbers.
    next_subscriber: AtomicU64,
    /// Last correlation id handed out.
    last_id: Mutex<CorrelationId>,
    /// Submitted messages awaiting resolution, oldest first.
    in_flight: Mutex<VecDeque<(SubmittedMessage, LoopbackConnection)>>,
    /// Linked endpoint that receives delivered messages.
    remote: Mutex<Weak<Endpoint>>,
}

impl Endpoint {
    fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            presence: Mutex::new(PresenceStatus::Unknown),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
            last_id: Mutex::new(CorrelationId::new(0)),
            in_flight: Mutex::new(VecDeque::new()),
            remote: Mutex::new(Weak::new()),
        }
    }

    /// Push an event to every live subscriber, pruning closed ones.
    fn emit(&self, event: &ContactEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(id, tx)| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                tracing::trace!(peer = %self.peer_id, subscriber = id, "pruning closed subscriber");
            }
            alive
        });
    }
}

/// In-process [`Contact`] implementation.
///
/// Cloning yields another handle to the same endpoint, so a test can keep
/// one handle to drive the peer while the conversation owns another.
#[derive(Debug, Clone)]
pub struct LoopbackContact {
    inner: Arc<Endpoint>,
}

impl LoopbackContact {
    /// Create an unlinked contact; delivered messages only resolve the send.
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            inner: Arc::new(Endpoint::new(peer_id)),
        }
    }

    /// Create a pair of linked contacts for two conversations.
    ///
    /// The first endpoint is `remote` as seen from `local`'s conversation,
    /// the second is `local` as seen from `remote`'s. Both start online.
    ///
    /// # Example
    ///
    /// ```rust
    /// use peerchat::contact::loopback::LoopbackContact;
    /// use peerchat::contact::{Contact, PeerId};
    ///
    /// let (bob, alice) = LoopbackContact::create_pair(PeerId::new("alice"), PeerId::new("bob"));
    /// assert_eq!(bob.peer_id().as_str(), "bob");
    /// assert_eq!(alice.peer_id().as_str(), "alice");
    /// ```
    pub fn create_pair(local: PeerId, remote: PeerId) -> (Self, Self) {
        let seen_by_local = Arc::new(Endpoint::new(remote));
        let seen_by_remote = Arc::new(Endpoint::new(local));

        *seen_by_local.remote.lock() = Arc::downgrade(&seen_by_remote);
        *seen_by_remote.remote.lock() = Arc::downgrade(&seen_by_local);
        *seen_by_local.presence.lock() = PresenceStatus::Online;
        *seen_by_remote.presence.lock() = PresenceStatus::Online;

        (
            Self {
                inner: seen_by_local,
            },
            Self {
                inner: seen_by_remote,
            },
        )
    }

    /// Change the reported presence, notifying subscribers if it differs.
    pub fn set_presence(&self, status: PresenceStatus) {
        {
            let mut presence = self.inner.presence.lock();
            if *presence == status {
                return;
            }
            *presence = status;
        }
        tracing::debug!(peer = %self.inner.peer_id, %status, "loopback presence changed");
        self.inner.emit(&ContactEvent::StatusChanged(status));
    }

    /// Deliver an arbitrary incoming message to subscribers.
    pub fn inject_incoming(&self, message: IncomingMessage) {
        self.inner.emit(&ContactEvent::IncomingMessage(message));
    }

    /// Report a completion for `correlation_id` without touching the
    /// in-flight queue. Useful for stale or unknown ids.
    pub fn inject_completion(&self, correlation_id: CorrelationId, outcome: SendOutcome) {
        self.inner.emit(&ContactEvent::SendCompleted {
            correlation_id,
            outcome,
        });
    }

    /// Resolve the oldest in-flight message.
    ///
    /// On [`SendOutcome::Delivered`] the message is first handed to the
    /// linked endpoint's subscribers as an incoming message, then the
    /// completion is reported to this endpoint's subscribers. Returns the
    /// resolved message, or `None` when nothing was in flight.
    pub fn complete_next(&self, outcome: SendOutcome) -> Option<SubmittedMessage> {
        let (submitted, connection) = self.inner.in_flight.lock().pop_front()?;

        if outcome == SendOutcome::Delivered
            && let Some(remote) = connection.remote.upgrade()
        {
            remote.emit(&ContactEvent::IncomingMessage(IncomingMessage {
                text: submitted.message.text.clone(),
                timestamp: submitted.message.timestamp,
                message_id: submitted.correlation_id,
                prior_message_id: submitted.message.last_received_id,
            }));
        }

        self.inner.emit(&ContactEvent::SendCompleted {
            correlation_id: submitted.correlation_id,
            outcome,
        });
        Some(submitted)
    }

    /// Resolve every in-flight message with the same outcome.
    ///
    /// Returns the number of messages resolved.
    pub fn complete_all(&self, outcome: SendOutcome) -> usize {
        let mut resolved = 0;
        while self.complete_next(outcome).is_some() {
            resolved += 1;
        }
        resolved
    }

    /// Snapshot of the in-flight queue, oldest first.
    #[must_use]
    pub fn in_flight(&self) -> Vec<SubmittedMessage> {
        self.inner
            .in_flight
            .lock()
            .iter()
            .map(|(submitted, _)| submitted.clone())
            .collect()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl Contact for LoopbackContact {
    type Connection = LoopbackConnection;

    fn peer_id(&self) -> &PeerId {
        &self.inner.peer_id
    }

    fn presence(&self) -> PresenceStatus {
        *self.inner.presence.lock()
    }

    fn connection(&self) -> LoopbackConnection {
        LoopbackConnection {
            remote: self.inner.remote.lock().clone(),
        }
    }

    fn submit_message(
        &self,
        connection: &LoopbackConnection,
        message: OutgoingMessage,
    ) -> CorrelationId {
        let correlation_id = {
            let mut last = self.inner.last_id.lock();
            *last = last.next();
            *last
        };

        tracing::trace!(
            peer = %self.inner.peer_id,
            %correlation_id,
            linked = connection.is_linked(),
            "loopback message submitted"
        );

        self.inner.in_flight.lock().push_back((
            SubmittedMessage {
                correlation_id,
                message,
            },
            connection.clone(),
        ));
        correlation_id
    }

    fn subscribe(&self, events: ContactEventSender) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push((id, events));

        let endpoint = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(endpoint) = endpoint.upgrade() {
                endpoint
                    .subscribers
                    .lock()
                    .retain(|(subscriber, _)| *subscriber != id);
            }
        })
    }
}
