//! Derived per-row metadata for presentation.
//!
//! Nothing here is stored: every value is computed from the current
//! messages and the peer's presence when asked for.

use serde::Serialize;

use peerchat_proto::message::{CorrelationId, MessageStatus, Timestamp};

use crate::contact::Contact;

use super::Conversation;

/// Visual grouping a row belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// No grouping.
    #[default]
    None,
    /// Sent while the peer was offline and before anything reached it.
    Offline,
}

impl Section {
    /// Label used by list views; empty for [`Section::None`].
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a list view needs to render one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    /// Row index, 0 is the newest.
    pub row: usize,
    /// Message text.
    pub text: String,
    /// When the message was sent.
    pub timestamp: Timestamp,
    /// Whether we sent the message.
    pub is_outgoing: bool,
    /// Current status.
    pub status: MessageStatus,
    /// Grouping of the row.
    pub section: Section,
    /// Milliseconds since the next older message; `None` for the oldest.
    pub timespan_ms: Option<i64>,
    /// Correlation id in the message's own direction.
    pub correlation_id: CorrelationId,
}

impl<C: Contact> Conversation<C> {
    /// Whether the message at `row` was sent by us.
    #[must_use]
    pub fn is_outgoing(&self, row: usize) -> Option<bool> {
        self.messages.get(row).map(super::Message::is_outgoing)
    }

    /// Milliseconds between the message at `row` and the next older one.
    ///
    /// `None` for the oldest row and for rows out of range. Negative when
    /// reordering placed an older message above a newer one.
    #[must_use]
    pub fn timespan(&self, row: usize) -> Option<i64> {
        let current = self.messages.get(row)?;
        let older = self.messages.get(row + 1)?;
        Some(current.timestamp.millis_since(older.timestamp))
    }

    /// Section of the message at `row`.
    ///
    /// A row is `Offline` when the peer is not online, no row from the
    /// newest down to this one was received or delivered, and this row is
    /// either the oldest or sits right above a received or delivered one.
    #[must_use]
    pub fn section(&self, row: usize) -> Section {
        if row >= self.messages.len() || self.peer_presence().is_online() {
            return Section::None;
        }

        if let Some(older) = self.messages.get(row + 1)
            && !older.status.confirms_peer()
        {
            return Section::None;
        }

        if self
            .messages
            .iter()
            .take(row + 1)
            .any(|m| m.status.confirms_peer())
        {
            return Section::None;
        }

        Section::Offline
    }

    /// Render the message at `row`.
    #[must_use]
    pub fn view(&self, row: usize) -> Option<MessageView> {
        let message = self.messages.get(row)?;
        Some(MessageView {
            row,
            text: message.text.clone(),
            timestamp: message.timestamp,
            is_outgoing: message.is_outgoing(),
            status: message.status,
            section: self.section(row),
            timespan_ms: self.timespan(row),
            correlation_id: message.correlation_id,
        })
    }

    /// Render every row, newest first.
    #[must_use]
    pub fn views(&self) -> Vec<MessageView> {
        (0..self.messages.len())
            .filter_map(|row| self.view(row))
            .collect()
    }
}
