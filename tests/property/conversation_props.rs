//! Property-based tests for the conversation store.
//!
//! Uses proptest to verify:
//! 1. The number of `Sending` rows equals sends minus resolved sends.
//! 2. Sending empty text never changes anything.
//! 3. An incoming message without a prior marker always lands on row 0.
//! 4. A marker inside the reorder window anchors exactly there, outside it
//!    falls back to row 0.
//! 5. Each incoming message raises the unread counter by one.
//! 6. Completions for unknown ids change nothing.

use peerchat::config::ConversationConfig;
use peerchat::contact::loopback::LoopbackContact;
use peerchat::contact::{ContactEvents, PeerId};
use peerchat::conversation::{Association, Conversation, Message};
use peerchat_proto::message::{
    CorrelationId, IncomingMessage, MessageStatus, SendOutcome, Timestamp,
};
use proptest::prelude::*;

type Chat = Conversation<LoopbackContact>;

/// A conversation with a loopback contact and its retained event stream.
fn attached() -> (Chat, LoopbackContact, ContactEvents) {
    let (mut conversation, _events) = Conversation::new(ConversationConfig::default());
    let bob = LoopbackContact::new(PeerId::new("bob"));
    let Association::Attached(contact_events) = conversation.set_contact(Some(bob.clone())) else {
        panic!("expected a fresh association");
    };
    (conversation, bob, contact_events)
}

fn incoming(id: u16, prior: Option<CorrelationId>) -> IncomingMessage {
    IncomingMessage {
        text: format!("in {id}"),
        timestamp: Timestamp::now(),
        message_id: CorrelationId::new(id),
        prior_message_id: prior,
    }
}

/// One step of a random conversation history.
#[derive(Debug, Clone)]
enum Step {
    Send(String),
    Receive(u16),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        "[a-z ]{1,16}".prop_map(Step::Send),
        (1..u16::MAX).prop_map(Step::Receive),
    ]
}

fn apply(conversation: &mut Chat, steps: &[Step]) {
    for step in steps {
        match step {
            Step::Send(text) => {
                conversation.send_message(text);
            }
            Step::Receive(id) => {
                conversation.receive_message(incoming(*id, None));
            }
        }
    }
}

fn snapshot(conversation: &Chat) -> Vec<Message> {
    conversation.messages().cloned().collect()
}

fn sending_count(conversation: &Chat) -> usize {
    conversation
        .messages()
        .filter(|m| m.status() == MessageStatus::Sending)
        .count()
}

proptest! {
    #[test]
    fn sending_rows_match_unresolved_sends(
        texts in prop::collection::vec("[a-z]{1,8}", 1..20),
        resolve in prop::collection::vec(any::<Option<bool>>(), 20),
    ) {
        let (mut conversation, _bob, _contact_events) = attached();
        let ids: Vec<_> = texts
            .iter()
            .filter_map(|t| conversation.send_message(t))
            .collect();
        prop_assert_eq!(ids.len(), texts.len());

        let mut resolved = 0;
        for (id, decision) in ids.iter().zip(&resolve) {
            if let Some(success) = decision {
                prop_assert!(conversation
                    .complete_send(*id, SendOutcome::from_success(*success))
                    .is_some());
                resolved += 1;
            }
        }
        prop_assert_eq!(sending_count(&conversation), ids.len() - resolved);
    }

    #[test]
    fn empty_send_changes_nothing(steps in prop::collection::vec(arb_step(), 0..16)) {
        let (mut conversation, bob, _contact_events) = attached();
        apply(&mut conversation, &steps);
        let before = snapshot(&conversation);
        let unread = conversation.unread_count();
        let in_flight = bob.in_flight().len();

        prop_assert_eq!(conversation.send_message(""), None);

        prop_assert_eq!(snapshot(&conversation), before);
        prop_assert_eq!(conversation.unread_count(), unread);
        prop_assert_eq!(bob.in_flight().len(), in_flight);
    }

    #[test]
    fn unmarked_incoming_lands_on_top(
        steps in prop::collection::vec(arb_step(), 0..16),
        id in 1..u16::MAX,
    ) {
        let (mut conversation, _bob, _contact_events) = attached();
        apply(&mut conversation, &steps);

        prop_assert_eq!(conversation.receive_message(incoming(id, None)), 0);
        prop_assert_eq!(conversation.message(0).map(Message::correlation_id), Some(CorrelationId::new(id)));
    }

    #[test]
    fn marker_anchors_within_window_only(total in 1usize..12, depth in 0usize..12) {
        prop_assume!(depth < total);
        let (mut conversation, _bob, _contact_events) = attached();
        for i in 0..total {
            conversation.send_message(&format!("out {i}"));
        }
        let marker = conversation.message(depth).map(Message::correlation_id);

        let row = conversation.receive_message(incoming(500, marker));

        let window = conversation.config().reorder_window;
        let expected = if depth < window { depth } else { 0 };
        prop_assert_eq!(row, expected);
    }

    #[test]
    fn unread_grows_by_one_per_incoming(ids in prop::collection::vec(1..u16::MAX, 0..32)) {
        let (mut conversation, _bob, _contact_events) = attached();
        for (n, id) in ids.iter().enumerate() {
            conversation.receive_message(incoming(*id, CorrelationId::from_marker(*id / 2)));
            prop_assert_eq!(conversation.unread_count(), n + 1);
        }
        prop_assert_eq!(conversation.len(), ids.len());
    }

    #[test]
    fn unknown_completion_changes_nothing(
        steps in prop::collection::vec(arb_step(), 0..16),
        offset in 1u16..1000,
        success in any::<bool>(),
    ) {
        let (mut conversation, _bob, _contact_events) = attached();
        apply(&mut conversation, &steps);
        let before = snapshot(&conversation);
        let unread = conversation.unread_count();

        // Loopback ids are sequential from 1, so this one was never handed out.
        let sent = u16::try_from(bob_ids_used(&steps)).unwrap_or(u16::MAX);
        let unknown = CorrelationId::new(sent.saturating_add(offset));

        prop_assert_eq!(
            conversation.complete_send(unknown, SendOutcome::from_success(success)),
            None
        );
        prop_assert_eq!(snapshot(&conversation), before);
        prop_assert_eq!(conversation.unread_count(), unread);
    }
}

fn bob_ids_used(steps: &[Step]) -> usize {
    steps.iter().filter(|s| matches!(s, Step::Send(_))).count()
}
