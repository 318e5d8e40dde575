// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_matches::assert_matches;
use transport_agreement_core::{Contact, Dictionary, Message, Visibility};
use transport_agreement_store::{GroupStore, MessageStore, Transaction, TransportKeyStore};

use crate::crypto::{AgreementCrypto, PublicKey, Rng};
use crate::delivery::{Delivery, DeliveryState};
use crate::manager::{DeliveryAction, ManagerError};
use crate::message::{ProtocolMessage, encode_activate_message, encode_key_message};
use crate::session::{Session, State, encode_session};
use crate::test_utils::{TestPeer, setup_logging, transport_id};
use crate::validator::validate_message;

async fn session_state(peer: &TestPeer, contact: &Contact) -> State {
    let sessions = peer.sessions(contact).await;
    assert_eq!(sessions.len(), 1, "expected exactly one session");
    sessions[0].1.state()
}

fn all_delivered(states: &[(transport_agreement_core::MessageId, DeliveryState)]) -> bool {
    states
        .iter()
        .all(|(_, state)| *state == DeliveryState::Delivered)
}

#[tokio::test]
async fn both_contacts_add_transport() {
    setup_logging();

    let mut alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact(&alice, 1).await;

    // Both sides started a session and sent their public key.
    assert_eq!(alice.outgoing(&bob_contact).await.len(), 1);
    assert_eq!(bob.outgoing(&alice_contact).await.len(), 1);
    assert_eq!(session_state(&alice, &bob_contact).await, State::AwaitKey);
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitKey);

    // Bob learns Alice's key, installs keys and confirms.
    let states = bob.sync_from(&alice, &bob_contact).await;
    assert_eq!(states.len(), 1);
    assert!(all_delivered(&states));
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitActivate);
    assert_eq!(bob.outgoing(&alice_contact).await.len(), 2);

    // Alice learns Bob's key and receives his confirmation right after.
    let states = alice.sync_from(&bob, &alice_contact).await;
    assert_eq!(states.len(), 2);
    assert!(all_delivered(&states));
    assert_eq!(session_state(&alice, &bob_contact).await, State::Activated);

    let states = bob.sync_from(&alice, &bob_contact).await;
    assert!(all_delivered(&states));
    assert_eq!(session_state(&bob, &alice_contact).await, State::Activated);

    let alice_keys = alice.key_manager.installed();
    let bob_keys = bob.key_manager.installed();
    assert_eq!(alice_keys.len(), 1);
    assert_eq!(bob_keys.len(), 1);
    assert_eq!(alice_keys[0].root_key, bob_keys[0].root_key);
    assert_eq!(alice_keys[0].transport_id, transport_id("tor"));

    // Both use the earlier of the two KEY timestamps.
    assert_eq!(alice_keys[0].epoch, 1_000);
    assert_eq!(bob_keys[0].epoch, 1_000);

    // Roles are opposite and keys are installed inactive first.
    assert!(alice_keys[0].alice);
    assert!(!bob_keys[0].alice);
    assert!(!alice_keys[0].active);
    assert!(!bob_keys[0].active);

    // The confirmation of the contact activated the keys.
    let key_set = alice.key_set(alice_keys[0].key_set_id).await.unwrap();
    assert!(key_set.active);
    let key_set = bob.key_set(bob_keys[0].key_set_id).await.unwrap();
    assert!(key_set.active);

    // Ephemeral keys are gone once the agreement is done.
    for (_, session) in alice.sessions(&bob_contact).await {
        assert!(session.local_key_pair().is_none());
        assert!(session.local_timestamp().is_none());
        assert!(session.last_local_message_id().is_some());
    }
}

#[tokio::test]
async fn key_for_unsupported_transport_is_deferred() {
    setup_logging();

    let mut alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &[]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact(&alice, 1).await;

    assert!(bob.outgoing(&alice_contact).await.is_empty());
    assert!(bob.sessions(&alice_contact).await.is_empty());

    let states = bob.sync_from(&alice, &bob_contact).await;
    assert_eq!(states[0].1, DeliveryState::Deferred);
    assert_eq!(bob.delivery.deferred(), &[states[0].0]);
    assert!(bob.sessions(&alice_contact).await.is_empty());

    // Bob starts supporting the transport.
    bob.restart(&["tor"]);
    bob.start().await.unwrap();
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitKey);

    let retried = bob.retry_deferred().await.unwrap();
    assert_eq!(retried, vec![(states[0].0, DeliveryState::Delivered)]);
    assert!(bob.delivery.deferred().is_empty());
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitActivate);

    assert!(all_delivered(&alice.sync_from(&bob, &alice_contact).await));
    assert!(all_delivered(&bob.sync_from(&alice, &bob_contact).await));
    assert_eq!(session_state(&alice, &bob_contact).await, State::Activated);
    assert_eq!(session_state(&bob, &alice_contact).await, State::Activated);

    let alice_keys = alice.key_manager.installed();
    let bob_keys = bob.key_manager.installed();
    assert_eq!(alice_keys[0].root_key, bob_keys[0].root_key);
    assert_eq!(alice_keys[0].epoch, bob_keys[0].epoch);
}

#[tokio::test]
async fn contact_with_existing_keys_answers_key() {
    setup_logging();

    let mut alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact_with_keys(&alice, 1, &["tor"]).await;

    // Bob already has keys and does not start a session on his own.
    assert!(bob.outgoing(&alice_contact).await.is_empty());
    assert!(bob.sessions(&alice_contact).await.is_empty());

    let states = bob.sync_from(&alice, &bob_contact).await;
    assert!(all_delivered(&states));
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitActivate);

    // Bob answered with his own key, followed by a confirmation depending on it.
    let outgoing = bob.outgoing(&alice_contact).await;
    assert_eq!(outgoing.len(), 2);
    let context = validate_message(&outgoing[1]).unwrap();
    assert_eq!(context.dependencies, vec![outgoing[0].id()]);

    assert!(all_delivered(&alice.sync_from(&bob, &alice_contact).await));
    assert!(all_delivered(&bob.sync_from(&alice, &bob_contact).await));
    assert_eq!(session_state(&alice, &bob_contact).await, State::Activated);
    assert_eq!(session_state(&bob, &alice_contact).await, State::Activated);

    let alice_keys = alice.key_manager.installed();
    let bob_keys = bob.key_manager.installed();
    assert_eq!(alice_keys.len(), 1);
    assert_eq!(bob_keys.len(), 1);
    assert_eq!(alice_keys[0].root_key, bob_keys[0].root_key);
    assert_eq!(alice_keys[0].epoch, 1_000);
    assert_eq!(bob_keys[0].epoch, 1_000);
    assert_ne!(alice_keys[0].alice, bob_keys[0].alice);
}

#[tokio::test]
async fn invalid_public_keys_are_rejected() {
    setup_logging();

    let alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact(&alice, 1).await;
    let group_id = alice.manager.contact_group(&bob_contact).id();

    // Low order point, the shared secret would be all zeros.
    let zero_key = encode_key_message(
        group_id,
        &transport_id("tor"),
        &PublicKey::from_bytes([0; 32]),
        1_500,
    )
    .unwrap();

    // Activation waiting for the invalid key message.
    let activate =
        encode_activate_message(group_id, &transport_id("tor"), zero_key.id(), 1_600).unwrap();
    assert_eq!(
        bob.receive(activate.clone()).await.unwrap(),
        DeliveryState::Pending
    );

    assert_eq!(
        bob.receive(zero_key).await.unwrap(),
        DeliveryState::Invalid
    );
    assert_eq!(
        bob.delivery.state(&activate.id()),
        Some(DeliveryState::Invalid)
    );

    let body = ProtocolMessage::Key {
        transport_id: transport_id("tor"),
        public_key: vec![7; 16],
    }
    .to_bytes()
    .unwrap();
    let short_key = Message::new(group_id, 1_700, body);
    assert_eq!(
        bob.receive(short_key).await.unwrap(),
        DeliveryState::Invalid
    );

    // Nothing changed on Bob's side.
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitKey);
    assert_eq!(bob.outgoing(&alice_contact).await.len(), 1);
    assert!(bob.key_manager.installed().is_empty());

    // The real key message of Alice is still accepted.
    assert!(all_delivered(&bob.sync_from(&alice, &bob_contact).await));
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitActivate);
}

#[tokio::test]
async fn malformed_body_is_invalid() {
    let alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    bob.add_contact(&alice, 1).await;
    let group_id = alice.manager.contact_group(&bob_contact).id();

    let message = Message::new(group_id, 1_000, vec![0xff, 0x00]);
    assert_eq!(
        bob.receive(message.clone()).await.unwrap(),
        DeliveryState::Invalid
    );

    // Receiving it again does not process it again.
    assert_eq!(
        bob.receive(message).await.unwrap(),
        DeliveryState::Invalid
    );
}

#[tokio::test]
async fn malformed_metadata_is_rejected() {
    let alice = TestPeer::new(1, &["tor"]).await;
    let bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let message = alice.outgoing(&bob_contact).await[0].clone();

    let action = alice
        .transaction(async || {
            alice
                .manager
                .incoming_message(&message, &Dictionary::new())
                .await
        })
        .await
        .unwrap();
    assert_eq!(action, DeliveryAction::Reject);
}

#[tokio::test]
async fn activate_waits_for_key() {
    setup_logging();

    let mut alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact(&alice, 1).await;

    // Alice learns Bob's key first and confirms.
    assert!(all_delivered(&alice.sync_from(&bob, &alice_contact).await));
    let outgoing = alice.outgoing(&bob_contact).await;
    assert_eq!(outgoing.len(), 2);
    let key = outgoing[0].clone();
    let activate = outgoing[1].clone();

    // Bob receives the confirmation before the key it depends on.
    assert_eq!(
        bob.receive(activate.clone()).await.unwrap(),
        DeliveryState::Pending
    );
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitKey);

    assert_eq!(bob.receive(key).await.unwrap(), DeliveryState::Delivered);
    assert_eq!(
        bob.delivery.state(&activate.id()),
        Some(DeliveryState::Delivered)
    );
    assert_eq!(session_state(&bob, &alice_contact).await, State::Activated);

    // Bob's own key set got activated.
    let bob_keys = bob.key_manager.installed();
    let key_set = bob.key_set(bob_keys[0].key_set_id).await.unwrap();
    assert!(key_set.active);
}

#[tokio::test]
async fn messages_in_unexpected_state_are_rejected() {
    setup_logging();

    let mut alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact(&alice, 1).await;
    let group_id = alice.manager.contact_group(&bob_contact).id();

    assert!(all_delivered(&bob.sync_from(&alice, &bob_contact).await));
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitActivate);
    let alice_key_id = alice.outgoing(&bob_contact).await[0].id();

    // A second key while awaiting activation.
    let crypto = AgreementCrypto::new(Rng::from_seed([9; 32]));
    let key_pair = crypto.generate_key_pair().unwrap();
    let second_key =
        encode_key_message(group_id, &transport_id("tor"), key_pair.public_key(), 1_200).unwrap();
    assert_eq!(
        bob.receive(second_key).await.unwrap(),
        DeliveryState::Invalid
    );
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitActivate);
    assert_eq!(bob.key_manager.installed().len(), 1);

    assert!(all_delivered(&alice.sync_from(&bob, &alice_contact).await));
    assert!(all_delivered(&bob.sync_from(&alice, &bob_contact).await));
    assert_eq!(session_state(&bob, &alice_contact).await, State::Activated);

    // Another confirmation after the keys were activated.
    let late_activate =
        encode_activate_message(group_id, &transport_id("tor"), alice_key_id, 5_000).unwrap();
    assert_eq!(
        bob.receive(late_activate.clone()).await.unwrap(),
        DeliveryState::Invalid
    );

    // Messages depending on it are invalid as well.
    let dependent =
        encode_activate_message(group_id, &transport_id("tor"), late_activate.id(), 6_000)
            .unwrap();
    assert_eq!(
        bob.receive(dependent).await.unwrap(),
        DeliveryState::Invalid
    );
    assert_eq!(session_state(&bob, &alice_contact).await, State::Activated);
}

#[tokio::test]
async fn key_without_session_or_keys_aborts() {
    setup_logging();

    let alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &[]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact(&alice, 1).await;

    // Bob supports the transport now but did not start any sessions yet.
    bob.restart(&["tor"]);

    let key = alice.outgoing(&bob_contact).await[0].clone();
    assert_matches!(
        bob.receive(key.clone()).await,
        Err(ManagerError::InvariantViolation(_))
    );
    assert_eq!(bob.delivery.state(&key.id()), Some(DeliveryState::Deferred));
    assert!(bob.key_manager.installed().is_empty());
    assert!(bob.outgoing(&alice_contact).await.is_empty());

    bob.start().await.unwrap();
    let retried = bob.retry_deferred().await.unwrap();
    assert_eq!(retried, vec![(key.id(), DeliveryState::Delivered)]);
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitActivate);
}

#[tokio::test]
async fn restart_does_not_start_sessions_twice() {
    let alice = TestPeer::new(1, &["tor", "bluetooth"]).await;
    let bob = TestPeer::new(2, &["tor", "bluetooth"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;

    alice.start().await.unwrap();
    alice.start().await.unwrap();

    let sessions = alice.sessions(&bob_contact).await;
    assert_eq!(sessions.len(), 2);
    assert!(
        sessions
            .iter()
            .all(|(_, session)| session.state() == State::AwaitKey)
    );
    assert_eq!(alice.outgoing(&bob_contact).await.len(), 2);
}

#[tokio::test]
async fn removing_contact_removes_sessions() {
    let alice = TestPeer::new(1, &["tor"]).await;
    let bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    assert_eq!(alice.sessions(&bob_contact).await.len(), 1);

    alice
        .transaction(async || alice.manager.removing_contact(&bob_contact).await)
        .await
        .unwrap();

    assert!(alice.sessions(&bob_contact).await.is_empty());
    assert!(alice.outgoing(&bob_contact).await.is_empty());
}

#[tokio::test]
async fn visibility_follows_client_versioning() {
    let alice = TestPeer::new(1, &["tor"]).await;
    let bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let group_id = alice.manager.contact_group(&bob_contact).id();

    let permit = alice.store.begin().await.unwrap();
    assert_eq!(
        alice
            .store
            .group_visibility(bob_contact.id(), &group_id)
            .await
            .unwrap(),
        Visibility::Shared
    );
    alice
        .manager
        .on_client_visibility_changing(&bob_contact, Visibility::Invisible)
        .await
        .unwrap();
    assert_eq!(
        alice
            .store
            .group_visibility(bob_contact.id(), &group_id)
            .await
            .unwrap(),
        Visibility::Invisible
    );
    alice.store.commit(permit).await.unwrap();
}

#[tokio::test]
async fn failed_retry_keeps_remaining_messages_deferred() {
    setup_logging();

    let alice = TestPeer::new(1, &["tor", "lan"]).await;
    let mut bob = TestPeer::new(2, &[]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact(&alice, 1).await;

    let states = bob.sync_from(&alice, &bob_contact).await;
    assert_eq!(states.len(), 2);
    assert!(
        states
            .iter()
            .all(|(_, state)| *state == DeliveryState::Deferred)
    );

    // Both transports are supported now, but no sessions were started yet.
    bob.restart(&["tor", "lan"]);
    assert_matches!(
        bob.retry_deferred().await,
        Err(ManagerError::InvariantViolation(_))
    );
    assert_eq!(bob.delivery.deferred().len(), 2);
    for (id, _) in &states {
        assert_eq!(bob.delivery.state(id), Some(DeliveryState::Deferred));
    }

    bob.start().await.unwrap();
    let retried = bob.retry_deferred().await.unwrap();
    assert_eq!(retried.len(), 2);
    assert!(all_delivered(&retried));
    assert!(bob.delivery.deferred().is_empty());
    assert!(
        bob.sessions(&alice_contact)
            .await
            .iter()
            .all(|(_, session)| session.state() == State::AwaitActivate)
    );
}

#[tokio::test]
async fn dependencies_delivered_before_restart_are_met() {
    setup_logging();

    let mut alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact(&alice, 1).await;
    let group_id = alice.manager.contact_group(&bob_contact).id();
    let bob_key_id = bob.outgoing(&alice_contact).await[0].id();

    assert!(all_delivered(&alice.sync_from(&bob, &alice_contact).await));
    let outgoing = alice.outgoing(&bob_contact).await;
    let key = outgoing[0].clone();
    let activate = outgoing[1].clone();

    assert_eq!(bob.receive(key).await.unwrap(), DeliveryState::Delivered);
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitActivate);

    // Bob restarts and loses all delivery bookkeeping.
    bob.delivery = Delivery::new();
    bob.restart(&["tor"]);
    bob.start().await.unwrap();

    // Bob's own messages were never received from Alice.
    let own_dependency =
        encode_activate_message(group_id, &transport_id("tor"), bob_key_id, 9_000).unwrap();
    assert_eq!(
        bob.receive(own_dependency).await.unwrap(),
        DeliveryState::Pending
    );

    assert_eq!(
        bob.receive(activate).await.unwrap(),
        DeliveryState::Delivered
    );
    assert_eq!(session_state(&bob, &alice_contact).await, State::Activated);
    let bob_keys = bob.key_manager.installed();
    assert!(bob.key_set(bob_keys[0].key_set_id).await.unwrap().active);
}

#[tokio::test]
async fn key_while_awaiting_key_with_installed_keys_aborts() {
    setup_logging();

    let alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact(&alice, 1).await;
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitKey);

    // Keys arrive through another path while the session still waits.
    bob.transaction(async || {
        bob.store
            .insert_transport_keys(alice_contact.id(), &transport_id("tor"), 0, false, true)
            .await
            .map_err(ManagerError::Store)
    })
    .await
    .unwrap();

    let key = alice.outgoing(&bob_contact).await[0].clone();
    assert_matches!(
        bob.receive(key.clone()).await,
        Err(ManagerError::InvariantViolation(_))
    );
    assert_eq!(bob.delivery.state(&key.id()), Some(DeliveryState::Deferred));

    // Everything was rolled back.
    assert_eq!(session_state(&bob, &alice_contact).await, State::AwaitKey);
    assert_eq!(bob.outgoing(&alice_contact).await.len(), 1);
    assert!(bob.key_manager.installed().is_empty());
}

#[tokio::test]
async fn multiple_session_records_abort() {
    setup_logging();

    let alice = TestPeer::new(1, &["tor"]).await;
    let mut bob = TestPeer::new(2, &["tor"]).await;
    let bob_contact = alice.add_contact(&bob, 1).await;
    let alice_contact = bob.add_contact(&alice, 1).await;
    let group_id = bob.manager.contact_group(&alice_contact).id();

    let duplicate = Message::new(group_id, 0, vec![9; 32]);
    bob.transaction(async || {
        bob.store
            .insert_message(
                &duplicate,
                &encode_session(&Session::activated(None), &transport_id("tor")),
            )
            .await
            .map_err(ManagerError::Store)
    })
    .await
    .unwrap();
    assert_eq!(bob.sessions(&alice_contact).await.len(), 2);

    let key = alice.outgoing(&bob_contact).await[0].clone();
    assert_matches!(
        bob.receive(key).await,
        Err(ManagerError::MultipleSessions(2, transport)) if transport == transport_id("tor")
    );
    assert_eq!(bob.outgoing(&alice_contact).await.len(), 1);
    assert!(bob.key_manager.installed().is_empty());
}
