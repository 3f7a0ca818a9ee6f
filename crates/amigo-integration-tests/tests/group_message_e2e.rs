//! Integration test: two-party welcome and message flow.
//!
//! 1. Alice creates a group and invites Bob (credentials pre-exchanged)
//! 2. Bob processes the welcome and joins
//! 3. Alice sends an encrypted message
//! 4. Bob decrypts, stores it, and acks
//! 5. The ack retires Alice's outbox row

use amigo_db::queries::{messages, outbox};
use amigo_integration_tests::{TestMesh, TestNode};

#[tokio::test(start_paused = true)]
async fn two_party_welcome_and_message() {
    let alice = TestNode::new("alice");
    let bob = TestNode::new("bob");
    let bob_credential = bob.core.state().lock().await.member.credential().clone();

    let mesh = TestMesh::new(vec![alice, bob], &[(0, 1)]);

    // =========================================================
    // Step 1-2: group creation and welcome
    // =========================================================
    let group = mesh.nodes[0]
        .core
        .create_group("amigos", 2, true)
        .await
        .expect("create group");
    mesh.nodes[0]
        .core
        .invite_contact(&bob_credential, &group)
        .await
        .expect("invite bob");
    mesh.pump().await;

    {
        let bob_state = mesh.nodes[1].core.state().lock().await;
        let gid = amigo_types::group::group_id_bytes(&group).expect("group id");
        assert!(bob_state.member.has_group(&gid), "bob should have joined");
    }

    // =========================================================
    // Step 3-5: message, storage, ack, outbox retirement
    // =========================================================
    let sent = mesh.nodes[0]
        .core
        .send_message(&group, "hi")
        .await
        .expect("send");
    mesh.pump().await;

    let bob_state = mesh.nodes[1].core.state().lock().await;
    let bob_messages = messages::list_for_group(&bob_state.conn, &group).expect("list");
    assert_eq!(bob_messages.len(), 1, "bob should hold exactly the one message");
    assert_eq!(bob_messages[0].id, sent.id);
    assert_eq!(bob_messages[0].contents, "hi");
    assert_eq!(bob_messages[0].timestamp, sent.timestamp);
    drop(bob_state);

    let alice_state = mesh.nodes[0].core.state().lock().await;
    assert_eq!(
        outbox::count(&alice_state.conn).expect("count"),
        0,
        "the ack should have retired alice's outbox row"
    );
}

#[tokio::test(start_paused = true)]
async fn welcome_replay_is_idempotent() {
    let alice = TestNode::new("alice");
    let bob = TestNode::new("bob");
    let bob_credential = bob.core.state().lock().await.member.credential().clone();
    let mesh = TestMesh::new(vec![alice, bob], &[(0, 1)]);

    let group = mesh.nodes[0]
        .core
        .create_group("amigos", 2, true)
        .await
        .expect("create group");
    mesh.nodes[0]
        .core
        .invite_contact(&bob_credential, &group)
        .await
        .expect("invite");

    // Capture the welcome frame and deliver it twice, out of band.
    let frames: Vec<Vec<u8>> = mesh.nodes[0]
        .radio
        .take_sent()
        .into_iter()
        .map(|t| t.bytes().to_vec())
        .collect();
    for _ in 0..2 {
        for frame in &frames {
            mesh.nodes[1].core.handle_inbound(frame, "node-0").await;
        }
    }
    mesh.pump().await;

    let bob_state = mesh.nodes[1].core.state().lock().await;
    let gid = amigo_types::group::group_id_bytes(&group).expect("group id");
    let epoch = bob_state.member.group(&gid).expect("group state").epoch();
    assert_eq!(epoch, 1, "replayed welcome must not re-advance state");
}
