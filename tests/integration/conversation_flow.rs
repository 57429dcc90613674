//! Integration tests for two conversations talking over linked loopback
//! contacts.
//!
//! Contact events are applied by hand, one at a time, so each test controls
//! exactly when a message or acknowledgement "arrives".

use peerchat::config::ConversationConfig;
use peerchat::contact::loopback::LoopbackContact;
use peerchat::contact::{ContactEvents, PeerId};
use peerchat::conversation::{Association, Conversation, ConversationEvent, Section};
use peerchat_proto::message::{CorrelationId, MessageStatus, SendOutcome};
use peerchat_proto::presence::PresenceStatus;

use tokio::sync::mpsc;

type Chat = Conversation<LoopbackContact>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Side {
    conversation: Chat,
    events: mpsc::UnboundedReceiver<ConversationEvent>,
    contact_events: ContactEvents,
    /// The other peer as seen from this side.
    peer: LoopbackContact,
}

impl Side {
    fn new(peer: LoopbackContact) -> Self {
        let (mut conversation, events) = Conversation::new(ConversationConfig::default());
        let Association::Attached(contact_events) = conversation.set_contact(Some(peer.clone()))
        else {
            panic!("expected a fresh association");
        };
        Self {
            conversation,
            events,
            contact_events,
            peer,
        }
    }

    /// Apply every queued contact event.
    fn pump(&mut self) {
        while let Ok(event) = self.contact_events.try_recv() {
            self.conversation.handle_contact_event(event);
        }
    }

    fn drain(&mut self) -> Vec<ConversationEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    fn texts(&self) -> Vec<String> {
        self.conversation
            .messages()
            .map(|m| m.text().to_string())
            .collect()
    }

    fn statuses(&self) -> Vec<MessageStatus> {
        self.conversation.messages().map(|m| m.status()).collect()
    }

    fn sections(&self) -> Vec<Section> {
        (0..self.conversation.len())
            .map(|row| self.conversation.section(row))
            .collect()
    }
}

/// Alice and Bob, each with a conversation attached to the other.
fn alice_and_bob() -> (Side, Side) {
    let (bob_for_alice, alice_for_bob) =
        LoopbackContact::create_pair(PeerId::new("alice"), PeerId::new("bob"));
    let mut alice = Side::new(bob_for_alice);
    let mut bob = Side::new(alice_for_bob);
    alice.drain();
    bob.drain();
    (alice, bob)
}

// ===========================================================================
// Delivery
// ===========================================================================

#[test]
fn delivered_message_reaches_peer_and_resolves_sender() {
    let (mut alice, mut bob) = alice_and_bob();

    let id = alice.conversation.send_message("hello bob").unwrap();
    assert_eq!(alice.statuses(), vec![MessageStatus::Sending]);

    alice.peer.complete_next(SendOutcome::Delivered);
    alice.pump();
    bob.pump();

    assert_eq!(alice.statuses(), vec![MessageStatus::Delivered]);
    assert_eq!(bob.texts(), vec!["hello bob"]);
    assert_eq!(bob.statuses(), vec![MessageStatus::Received]);
    assert_eq!(bob.conversation.last_received_id(), Some(id));
    assert_eq!(bob.conversation.unread_count(), 1);
    assert_eq!(alice.conversation.unread_count(), 0);
}

#[test]
fn failed_message_never_reaches_peer() {
    let (mut alice, mut bob) = alice_and_bob();

    alice.conversation.send_message("lost").unwrap();
    alice.peer.complete_next(SendOutcome::Failed);
    alice.pump();
    bob.pump();

    assert_eq!(alice.statuses(), vec![MessageStatus::Error]);
    assert!(bob.conversation.is_empty());
}

#[test]
fn completions_resolve_out_of_order_sends_independently() {
    let (mut alice, _bob) = alice_and_bob();

    alice.conversation.send_message("one").unwrap();
    alice.conversation.send_message("two").unwrap();
    alice.conversation.send_message("three").unwrap();

    alice.peer.complete_next(SendOutcome::Delivered);
    alice.peer.complete_next(SendOutcome::Failed);
    alice.pump();

    assert_eq!(alice.texts(), vec!["three", "two", "one"]);
    assert_eq!(
        alice.statuses(),
        vec![
            MessageStatus::Sending,
            MessageStatus::Error,
            MessageStatus::Delivered
        ]
    );
}

// ===========================================================================
// Latency crossing
// ===========================================================================

/// Both peers type at the same time. Bob's reply names Alice's first message
/// as the last one he saw, so Alice keeps it right above that message even
/// though her own newer message was already shown.
#[test]
fn crossing_messages_end_up_in_the_same_order_on_both_sides() {
    let (mut alice, mut bob) = alice_and_bob();

    alice.conversation.send_message("a1").unwrap();
    alice.peer.complete_next(SendOutcome::Delivered);
    alice.pump();
    bob.pump();

    // Messages cross in flight.
    bob.conversation.send_message("b1").unwrap();
    alice.conversation.send_message("a2").unwrap();

    bob.peer.complete_next(SendOutcome::Delivered);
    alice.peer.complete_next(SendOutcome::Delivered);
    alice.pump();
    bob.pump();

    assert_eq!(alice.texts(), vec!["a2", "b1", "a1"]);
    assert_eq!(bob.texts(), vec!["a2", "b1", "a1"]);

    assert_eq!(
        alice.statuses(),
        vec![
            MessageStatus::Delivered,
            MessageStatus::Received,
            MessageStatus::Delivered
        ]
    );
}

#[test]
fn reply_carries_last_received_marker() {
    let (mut alice, mut bob) = alice_and_bob();

    let question = alice.conversation.send_message("question").unwrap();
    alice.peer.complete_next(SendOutcome::Delivered);
    bob.pump();

    bob.conversation.send_message("answer").unwrap();
    let in_flight = bob.peer.in_flight();
    assert_eq!(in_flight.len(), 1);
    assert_eq!(in_flight[0].message.last_received_id, Some(question));
}

#[test]
fn correlation_ids_are_per_direction() {
    let (mut alice, mut bob) = alice_and_bob();

    // Both sides assign id 1 to their first message.
    let from_alice = alice.conversation.send_message("a").unwrap();
    let from_bob = bob.conversation.send_message("b").unwrap();
    assert_eq!(from_alice, CorrelationId::new(1));
    assert_eq!(from_bob, CorrelationId::new(1));

    bob.peer.complete_next(SendOutcome::Delivered);
    alice.pump();
    alice.peer.complete_next(SendOutcome::Failed);
    alice.pump();

    // The failure only touched Alice's own message.
    let received = alice.conversation.index_of(from_bob, false).unwrap();
    let sent = alice.conversation.index_of(from_alice, true).unwrap();
    assert_eq!(
        alice.conversation.message(received).unwrap().status(),
        MessageStatus::Received
    );
    assert_eq!(
        alice.conversation.message(sent).unwrap().status(),
        MessageStatus::Error
    );
}

// ===========================================================================
// Presence and sections
// ===========================================================================

#[test]
fn offline_section_follows_peer_presence() {
    let (mut alice, _bob) = alice_and_bob();

    alice.peer.set_presence(PresenceStatus::Offline);
    alice.pump();
    // Nothing to re-evaluate yet.
    assert!(alice.drain().is_empty());

    alice.conversation.send_message("first").unwrap();
    alice.conversation.send_message("second").unwrap();
    assert_eq!(alice.sections(), vec![Section::None, Section::Offline]);
    alice.drain();

    alice.peer.set_presence(PresenceStatus::Online);
    alice.pump();
    assert_eq!(
        alice.drain(),
        vec![ConversationEvent::SectionsChanged { count: 2 }]
    );
    assert_eq!(alice.sections(), vec![Section::None, Section::None]);
}

#[test]
fn offline_run_starts_above_last_confirmed_message() {
    let (mut alice, mut bob) = alice_and_bob();

    bob.conversation.send_message("hi alice").unwrap();
    bob.peer.complete_next(SendOutcome::Delivered);
    alice.pump();

    alice.peer.set_presence(PresenceStatus::Offline);
    alice.pump();
    alice.conversation.send_message("are you there?").unwrap();
    alice.conversation.send_message("hello?").unwrap();

    assert_eq!(
        alice.sections(),
        vec![Section::None, Section::Offline, Section::None]
    );
}

// ===========================================================================
// Clear, unread, reassociation
// ===========================================================================

#[test]
fn completion_after_clear_is_ignored() {
    let (mut alice, mut bob) = alice_and_bob();

    alice.conversation.send_message("soon gone").unwrap();
    alice.conversation.clear();
    alice.drain();

    alice.peer.complete_next(SendOutcome::Delivered);
    alice.pump();
    bob.pump();

    assert!(alice.conversation.is_empty());
    assert!(alice.drain().is_empty());
    // The peer still got it.
    assert_eq!(bob.texts(), vec!["soon gone"]);
}

#[test]
fn unread_counts_every_arrival_until_reset() {
    let (mut alice, mut bob) = alice_and_bob();

    for text in ["one", "two", "three"] {
        alice.conversation.send_message(text).unwrap();
    }
    alice.peer.complete_all(SendOutcome::Delivered);
    bob.pump();
    assert_eq!(bob.conversation.unread_count(), 3);

    bob.conversation.reset_unread_count();
    assert_eq!(bob.conversation.unread_count(), 0);
    assert_eq!(bob.conversation.len(), 3);

    alice.conversation.send_message("four").unwrap();
    alice.peer.complete_next(SendOutcome::Delivered);
    bob.pump();
    assert_eq!(bob.conversation.unread_count(), 1);

    bob.conversation.clear();
    assert_eq!(bob.conversation.unread_count(), 0);
}

#[test]
fn reassociation_forgets_previous_peer() {
    let (mut alice, mut bob) = alice_and_bob();

    alice.conversation.send_message("to bob").unwrap();
    bob.conversation.send_message("from bob").unwrap();

    let carol = LoopbackContact::new(PeerId::new("carol"));
    let Association::Attached(carol_events) =
        alice.conversation.set_contact(Some(carol.clone()))
    else {
        panic!("expected a fresh association");
    };
    alice.contact_events = carol_events;
    assert!(alice.conversation.is_empty());

    // Late traffic from Bob lands in the dropped stream.
    alice.peer.complete_next(SendOutcome::Delivered);
    bob.peer.complete_next(SendOutcome::Delivered);
    alice.pump();
    assert!(alice.conversation.is_empty());

    alice.conversation.send_message("to carol").unwrap();
    assert_eq!(carol.in_flight().len(), 1);
    carol.complete_next(SendOutcome::Delivered);
    alice.pump();
    assert_eq!(alice.texts(), vec!["to carol"]);
    assert_eq!(alice.statuses(), vec![MessageStatus::Delivered]);
}
