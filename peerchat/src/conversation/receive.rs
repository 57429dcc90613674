//! Incoming messages for [`Conversation`].
//!
//! Two peers typing at the same time see each other's messages late. An
//! incoming message carries the id of the last message its sender had seen
//! from us; inserting it right above that point, instead of always at the
//! top, keeps a reply next to what it replies to. Only the newest few rows
//! are ever considered, so old history never moves.

use std::collections::VecDeque;

use peerchat_proto::message::{CorrelationId, IncomingMessage, MessageStatus};

use crate::contact::Contact;

use super::{Conversation, ConversationEvent, Message};

/// Row at which an incoming message with marker `prior` is inserted.
///
/// Scans the newest `window` rows, newest first, and stops at the first row
/// that is itself a received message or carries the `prior` id. Falls back
/// to row 0 when `prior` is absent or zero, or nothing matches inside the
/// window.
#[must_use]
pub fn anchor_row(
    messages: &VecDeque<Message>,
    prior: Option<CorrelationId>,
    window: usize,
) -> usize {
    let Some(prior) = prior.and_then(|p| CorrelationId::from_marker(p.get())) else {
        return 0;
    };

    messages
        .iter()
        .take(window)
        .position(|m| m.status == MessageStatus::Received || m.correlation_id == prior)
        .unwrap_or(0)
}

impl<C: Contact> Conversation<C> {
    /// Stores a message from the peer and returns the row it landed on.
    ///
    /// Incoming messages are never rejected or deduplicated. Every call
    /// increments the unread counter.
    pub fn receive_message(&mut self, message: IncomingMessage) -> usize {
        let row = anchor_row(
            &self.messages,
            message.prior_message_id,
            self.config.reorder_window,
        );

        let text = if self.config.trim_incoming {
            message.text.trim().to_string()
        } else {
            message.text
        };

        // Id 0 is "unknown" on the wire and must not be echoed back as a marker.
        self.last_received_id = CorrelationId::from_marker(message.message_id.get());
        self.messages.insert(
            row,
            Message {
                text,
                timestamp: message.timestamp,
                correlation_id: message.message_id,
                status: MessageStatus::Received,
            },
        );
        tracing::debug!(
            message_id = %message.message_id,
            prior = ?message.prior_message_id.map(CorrelationId::get),
            row,
            "incoming message inserted"
        );
        self.emit(ConversationEvent::RowsInserted {
            first: row,
            count: 1,
        });

        self.unread_count += 1;
        self.emit(ConversationEvent::UnreadCountChanged(self.unread_count));

        row
    }
}
