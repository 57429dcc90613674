//! Outgoing messages for [`Conversation`].
//!
//! A sent message is echoed locally as `Sending` right away and resolved
//! to `Delivered` or `Error` once the contact reports the outcome for its
//! correlation id. Both resolved states are terminal.

use peerchat_proto::message::{CorrelationId, MessageStatus, OutgoingMessage, SendOutcome, Timestamp};

use crate::contact::Contact;

use super::{Conversation, ConversationEvent, Message};

impl<C: Contact> Conversation<C> {
    /// Submits `text` to the contact and prepends it as `Sending`.
    ///
    /// Returns the correlation id assigned by the contact, or `None` when
    /// nothing was sent: empty text, or no contact associated.
    pub fn send_message(&mut self, text: &str) -> Option<CorrelationId> {
        if text.is_empty() {
            return None;
        }
        let Some(contact) = self.contact.as_ref() else {
            tracing::warn!("send_message without an associated contact, dropping");
            return None;
        };

        let timestamp = Timestamp::now();
        let connection = contact.connection();
        let correlation_id = contact.submit_message(
            &connection,
            OutgoingMessage {
                text: text.to_string(),
                timestamp,
                last_received_id: self.last_received_id,
            },
        );

        self.messages.push_front(Message {
            text: text.to_string(),
            timestamp,
            correlation_id,
            status: MessageStatus::Sending,
        });
        tracing::debug!(%correlation_id, "outgoing message appended");
        self.emit(ConversationEvent::RowsInserted { first: 0, count: 1 });

        Some(correlation_id)
    }

    /// Resolves the outgoing message with `correlation_id`.
    ///
    /// Completions that match no outgoing message (the conversation was
    /// cleared or reassociated meanwhile) or that target an already
    /// resolved message are dropped. Returns the updated row.
    pub fn complete_send(
        &mut self,
        correlation_id: CorrelationId,
        outcome: SendOutcome,
    ) -> Option<usize> {
        let Some(row) = self.index_of(correlation_id, true) else {
            tracing::debug!(%correlation_id, "completion for unknown message dropped");
            return None;
        };

        let message = &mut self.messages[row];
        if message.status.is_terminal() {
            tracing::debug!(
                %correlation_id,
                status = %message.status,
                "completion for resolved message dropped"
            );
            return None;
        }

        message.status = MessageStatus::from(outcome);
        match outcome {
            SendOutcome::Delivered => {
                tracing::debug!(%correlation_id, row, "message delivered");
            }
            SendOutcome::Failed => {
                tracing::warn!(%correlation_id, row, "message delivery failed");
            }
        }
        self.emit(ConversationEvent::RowChanged { row });
        Some(row)
    }
}
