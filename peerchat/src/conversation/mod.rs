//! Per-contact conversation store.
//!
//! A [`Conversation`] owns the message history of one conversation,
//! newest first, together with the unread counter and the association with
//! a [`Contact`]. Mutations are applied synchronously and report what
//! changed through a stream of [`ConversationEvent`]s that a presentation
//! layer can mirror row by row.
//!
//! The implementation is split across submodules:
//! - `send`: outgoing messages and the delivery-status state machine
//! - `receive`: incoming messages and latency-tolerant insertion
//! - `view`: derived per-row metadata (section label, time gap)

mod receive;
mod send;
mod view;

pub use receive::anchor_row;
pub use view::{MessageView, Section};

use std::collections::VecDeque;

use tokio::sync::mpsc;

use peerchat_proto::message::{CorrelationId, MessageStatus, Timestamp};
use peerchat_proto::presence::PresenceStatus;

use crate::config::ConversationConfig;
use crate::contact::{Contact, ContactEvent, ContactEvents, PeerId, Subscription};

/// A message stored in a conversation.
///
/// Text, timestamp and correlation id are fixed at creation; only the
/// status moves, and only along the delivery state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: String,
    timestamp: Timestamp,
    correlation_id: CorrelationId,
    status: MessageStatus,
}

impl Message {
    /// Message text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// When the message was sent.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Id correlating this message with its reply, in its direction's id-space.
    #[must_use]
    pub const fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> MessageStatus {
        self.status
    }

    /// Whether we sent this message.
    #[must_use]
    pub const fn is_outgoing(&self) -> bool {
        self.status.is_outgoing()
    }
}

/// Change notifications emitted by a [`Conversation`].
///
/// Row numbers refer to the state right after the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// Every row was discarded because the contact changed.
    Reset,
    /// The associated contact changed.
    ContactChanged(Option<PeerId>),
    /// `count` rows were inserted starting at `first`.
    RowsInserted {
        /// First inserted row.
        first: usize,
        /// Number of inserted rows.
        count: usize,
    },
    /// `count` rows starting at `first` were removed.
    RowsRemoved {
        /// First removed row.
        first: usize,
        /// Number of removed rows.
        count: usize,
    },
    /// The status of a single row changed.
    RowChanged {
        /// The changed row.
        row: usize,
    },
    /// Section labels of all `count` rows may have changed.
    SectionsChanged {
        /// Number of rows to re-evaluate, starting at row 0.
        count: usize,
    },
    /// The unread counter changed.
    UnreadCountChanged(usize),
}

/// Result of [`Conversation::set_contact`].
#[derive(Debug)]
pub enum Association {
    /// The given contact was already associated; nothing happened.
    Unchanged,
    /// The conversation is now without a contact.
    Detached,
    /// A new contact was attached; its events arrive on this stream.
    Attached(ContactEvents),
}

/// Message store for one conversation with one contact.
///
/// All mutations run to completion and never block; the caller is expected
/// to apply them one at a time (see [`crate::dispatch`]).
pub struct Conversation<C: Contact> {
    /// Store settings.
    config: ConversationConfig,
    /// The peer this conversation is with.
    contact: Option<C>,
    /// Keeps the current contact's event sink registered.
    subscription: Option<Subscription>,
    /// Messages, newest first.
    messages: VecDeque<Message>,
    /// Id of the most recently received message.
    last_received_id: Option<CorrelationId>,
    /// Incoming messages not yet acknowledged as read.
    unread_count: usize,
    /// Channel for change notifications.
    event_tx: mpsc::UnboundedSender<ConversationEvent>,
}

impl<C: Contact> Conversation<C> {
    /// Creates an empty conversation without a contact.
    ///
    /// Returns the conversation and the receiver for its
    /// [`ConversationEvent`]s.
    #[must_use]
    pub fn new(config: ConversationConfig) -> (Self, mpsc::UnboundedReceiver<ConversationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let conversation = Self {
            config,
            contact: None,
            subscription: None,
            messages: VecDeque::new(),
            last_received_id: None,
            unread_count: 0,
            event_tx,
        };
        (conversation, event_rx)
    }

    /// Associates the conversation with `contact`.
    ///
    /// Does nothing when `contact` is the same peer as the current one.
    /// Otherwise discards every message, unsubscribes from the previous
    /// contact and subscribes to the new one. The unread counter is left
    /// alone.
    pub fn set_contact(&mut self, contact: Option<C>) -> Association {
        let same_peer = match (&self.contact, &contact) {
            (Some(current), Some(new)) => current.peer_id() == new.peer_id(),
            (None, None) => true,
            _ => false,
        };
        if same_peer {
            return Association::Unchanged;
        }

        self.messages.clear();
        self.subscription = None;
        self.emit(ConversationEvent::Reset);

        let (association, peer) = match &contact {
            Some(new) => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.subscription = Some(new.subscribe(tx));
                (Association::Attached(rx), Some(new.peer_id().clone()))
            }
            None => (Association::Detached, None),
        };
        self.contact = contact;

        tracing::debug!(peer = ?peer.as_ref().map(PeerId::as_str), "conversation contact changed");
        self.emit(ConversationEvent::ContactChanged(peer));
        association
    }

    /// Applies one notification from the associated contact.
    pub fn handle_contact_event(&mut self, event: ContactEvent) {
        match event {
            ContactEvent::IncomingMessage(message) => {
                self.receive_message(message);
            }
            ContactEvent::StatusChanged(status) => {
                tracing::debug!(%status, "peer presence changed");
                self.peer_status_changed();
            }
            ContactEvent::SendCompleted {
                correlation_id,
                outcome,
            } => {
                self.complete_send(correlation_id, outcome);
            }
        }
    }

    /// Re-announces section labels after the peer's presence changed.
    pub fn peer_status_changed(&self) {
        if self.messages.is_empty() {
            return;
        }
        self.emit(ConversationEvent::SectionsChanged {
            count: self.messages.len(),
        });
    }

    /// Discards every message, then resets the unread counter.
    ///
    /// Does nothing on an empty conversation.
    pub fn clear(&mut self) {
        if self.messages.is_empty() {
            return;
        }

        let count = self.messages.len();
        self.messages.clear();
        tracing::debug!(count, "conversation cleared");
        self.emit(ConversationEvent::RowsRemoved { first: 0, count });

        self.reset_unread_count();
    }

    /// Marks all messages as read.
    pub fn reset_unread_count(&mut self) {
        if self.unread_count == 0 {
            return;
        }
        self.unread_count = 0;
        self.emit(ConversationEvent::UnreadCountChanged(0));
    }

    /// The associated contact, if any.
    #[must_use]
    pub const fn contact(&self) -> Option<&C> {
        self.contact.as_ref()
    }

    /// Presence of the associated contact; `Unknown` without one.
    #[must_use]
    pub fn peer_presence(&self) -> PresenceStatus {
        self.contact
            .as_ref()
            .map_or(PresenceStatus::Unknown, |contact| contact.presence())
    }

    /// Store settings.
    #[must_use]
    pub const fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Incoming messages not yet acknowledged as read.
    #[must_use]
    pub const fn unread_count(&self) -> usize {
        self.unread_count
    }

    /// Id of the most recently received message.
    #[must_use]
    pub const fn last_received_id(&self) -> Option<CorrelationId> {
        self.last_received_id
    }

    /// The message at `row` (0 is the newest).
    #[must_use]
    pub fn message(&self, row: usize) -> Option<&Message> {
        self.messages.get(row)
    }

    /// All messages, newest first.
    pub fn messages(&self) -> impl ExactSizeIterator<Item = &Message> {
        self.messages.iter()
    }

    /// Row of the message with `id` in the given direction.
    #[must_use]
    pub fn index_of(&self, id: CorrelationId, outgoing: bool) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.correlation_id == id && m.is_outgoing() == outgoing)
    }

    fn emit(&self, event: ConversationEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }
}

impl<C: Contact> std::fmt::Debug for Conversation<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("peer", &self.contact.as_ref().map(|c| c.peer_id().as_str()))
            .field("messages", &self.messages)
            .field("last_received_id", &self.last_received_id)
            .field("unread_count", &self.unread_count)
            .finish_non_exhaustive()
    }
}
