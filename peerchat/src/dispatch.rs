//! Event dispatcher that drives a [`Conversation`] on a tokio task.
//!
//! The conversation itself is synchronous. This module owns it on a
//! background task and feeds it, one at a time, with commands from the
//! presentation layer and with events from the current contact.
//!
//! # Architecture
//!
//! ```text
//! UI  ─── Command ──→  dispatcher task  ←── ContactEvent ─── contact
//!     ←─ ConversationEvent ──┘
//! ```
//!
//! Contact events already queued when a command arrives are applied first.
//! Reassociating drops the previous contact's event stream together with
//! anything still queued on it.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use peerchat_proto::message::CorrelationId;
use peerchat_proto::presence::PresenceStatus;

use crate::contact::{Contact, ContactEvent, ContactEvents, PeerId};
use crate::conversation::{Association, Conversation, MessageView};

/// Errors returned by [`ConversationHandle`] methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher task is no longer running.
    #[error("conversation dispatcher has stopped")]
    Closed,
}

/// Commands accepted by the dispatcher task.
pub enum Command<C> {
    /// Send a text message.
    SendMessage {
        /// The message text.
        text: String,
        /// Receives the correlation id, `None` if nothing was sent.
        reply: oneshot::Sender<Option<CorrelationId>>,
    },
    /// Discard all messages and reset the unread counter.
    Clear,
    /// Mark everything as read.
    ResetUnreadCount,
    /// Associate with another contact, or none.
    SetContact(Option<C>),
    /// Render the current state.
    Snapshot(oneshot::Sender<Snapshot>),
    /// Stop the dispatcher task.
    Shutdown,
}

impl<C> std::fmt::Debug for Command<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SendMessage { text, .. } => {
                f.debug_struct("SendMessage").field("text", text).finish_non_exhaustive()
            }
            Self::Clear => f.write_str("Clear"),
            Self::ResetUnreadCount => f.write_str("ResetUnreadCount"),
            Self::SetContact(contact) => f
                .debug_tuple("SetContact")
                .field(&contact.as_ref().map(|_| ".."))
                .finish(),
            Self::Snapshot(_) => f.write_str("Snapshot"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Rendered state of a conversation at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Snapshot {
    /// Peer the conversation is with.
    pub peer: Option<PeerId>,
    /// Presence of that peer.
    pub presence: PresenceStatus,
    /// Rows, newest first.
    pub rows: Vec<MessageView>,
    /// Unread counter.
    pub unread_count: usize,
    /// Id of the last received message.
    pub last_received_id: Option<CorrelationId>,
}

impl Snapshot {
    fn of<C: Contact>(conversation: &Conversation<C>) -> Self {
        Self {
            peer: conversation.contact().map(|c| c.peer_id().clone()),
            presence: conversation.peer_presence(),
            rows: conversation.views(),
            unread_count: conversation.unread_count(),
            last_received_id: conversation.last_received_id(),
        }
    }
}

/// Cloneable handle for issuing commands to a running dispatcher.
pub struct ConversationHandle<C> {
    commands: mpsc::Sender<Command<C>>,
}

impl<C> Clone for ConversationHandle<C> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<C> std::fmt::Debug for ConversationHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl<C: Send + 'static> ConversationHandle<C> {
    /// Send `text` to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub async fn send_message(
        &self,
        text: impl Into<String>,
    ) -> Result<Option<CorrelationId>, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::SendMessage {
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| DispatchError::Closed)
    }

    /// Discard all messages and reset the unread counter.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub async fn clear(&self) -> Result<(), DispatchError> {
        self.command(Command::Clear).await
    }

    /// Mark everything as read.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub async fn reset_unread_count(&self) -> Result<(), DispatchError> {
        self.command(Command::ResetUnreadCount).await
    }

    /// Associate the conversation with `contact`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub async fn set_contact(&self, contact: Option<C>) -> Result<(), DispatchError> {
        self.command(Command::SetContact(contact)).await
    }

    /// Render the current state.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub async fn snapshot(&self) -> Result<Snapshot, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| DispatchError::Closed)
    }

    /// Ask the dispatcher to stop after the commands queued before this one.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has already stopped.
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        self.command(Command::Shutdown).await
    }

    async fn command(&self, command: Command<C>) -> Result<(), DispatchError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DispatchError::Closed)
    }
}

/// Spawn a dispatcher task that owns `conversation`.
///
/// `contact_events` is the stream of the contact the conversation is
/// already associated with, if any (as returned by
/// [`Conversation::set_contact`]). The task ends on [`Command::Shutdown`] or
/// once every handle is dropped, and yields the conversation back.
pub fn spawn<C>(
    conversation: Conversation<C>,
    contact_events: Option<ContactEvents>,
    capacity: usize,
) -> (ConversationHandle<C>, JoinHandle<Conversation<C>>)
where
    C: Contact + Send + 'static,
{
    let (commands_tx, commands_rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(run(conversation, contact_events, commands_rx));
    (
        ConversationHandle {
            commands: commands_tx,
        },
        task,
    )
}

/// Dispatcher loop: apply one event or command at a time until stopped.
async fn run<C: Contact>(
    mut conversation: Conversation<C>,
    mut contact_events: Option<ContactEvents>,
    mut commands: mpsc::Receiver<Command<C>>,
) -> Conversation<C> {
    tracing::debug!("conversation dispatcher started");
    loop {
        tokio::select! {
            biased;

            event = next_contact_event(&mut contact_events) => {
                if let Some(event) = event {
                    conversation.handle_contact_event(event);
                } else {
                    tracing::debug!("contact event stream closed");
                    contact_events = None;
                }
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    tracing::debug!("all conversation handles dropped");
                    break;
                };
                match command {
                    Command::SendMessage { text, reply } => {
                        let id = conversation.send_message(&text);
                        let _ = reply.send(id);
                    }
                    Command::Clear => conversation.clear(),
                    Command::ResetUnreadCount => conversation.reset_unread_count(),
                    Command::SetContact(contact) => match conversation.set_contact(contact) {
                        Association::Unchanged => {}
                        Association::Detached => contact_events = None,
                        Association::Attached(events) => contact_events = Some(events),
                    },
                    Command::Snapshot(reply) => {
                        let _ = reply.send(Snapshot::of(&conversation));
                    }
                    Command::Shutdown => break,
                }
            }
        }
    }
    tracing::debug!("conversation dispatcher stopped");
    conversation
}

/// Next event of the current contact; pending forever without one.
async fn next_contact_event(events: &mut Option<ContactEvents>) -> Option<ContactEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
