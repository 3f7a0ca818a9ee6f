//! Integration test: retry until ack.
//!
//! Alice's peer is out of range. The outbox pass rebroadcasts on its
//! interval, counting attempts; when Bob finally hears one and acks,
//! the row retires with its attempt count intact.

use amigo_db::queries::outbox;
use amigo_integration_tests::{TestMesh, TestNode};
use amigo_mesh::core::CoreState;
use amigo_mesh::outbox::retry_outgoing_messages;

#[tokio::test(start_paused = true)]
async fn retry_until_ack() {
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
    mesh.pump().await;

    // =========================================================
    // Step 1: send while bob is out of range
    // =========================================================
    let sent = mesh.nodes[0]
        .core
        .send_message(&group, "anyone there?")
        .await
        .expect("send");
    // The initial broadcast evaporates.
    mesh.nodes[0].radio.take_sent();

    // =========================================================
    // Step 2: three retry passes, 31 seconds apart
    // =========================================================
    let config = mesh.nodes[0].core.config().clone();
    let radio = mesh.nodes[0].core.radio().clone();
    let base = amigo_mesh::time::now_ms();
    for attempt in 1..=3i64 {
        let mut guard = mesh.nodes[0].core.state().lock().await;
        let CoreState { conn, member, .. } = &mut *guard;
        let sent_rows =
            retry_outgoing_messages(conn, member, radio.as_ref(), &config, base + attempt * 31_000)
                .await
                .expect("retry pass");
        assert_eq!(sent_rows, 1, "attempt {attempt} should rebroadcast");
    }

    // Attempts 1-2 also evaporate; keep the third on the air.
    let retry_frames: Vec<Vec<u8>> = mesh.nodes[0]
        .radio
        .take_sent()
        .into_iter()
        .map(|t| t.bytes().to_vec())
        .collect();

    {
        let guard = mesh.nodes[0].core.state().lock().await;
        let row = outbox::get(&guard.conn, &sent.id).expect("get").expect("row");
        assert_eq!(row.retry_count, 3);
    }

    // =========================================================
    // Step 3: bob comes into range before attempt 4 and acks
    // =========================================================
    let last_frame = retry_frames.last().expect("a retry frame");
    mesh.nodes[1].core.handle_inbound(last_frame, "node-0").await;
    mesh.pump().await;

    let guard = mesh.nodes[0].core.state().lock().await;
    assert_eq!(
        outbox::count(&guard.conn).expect("count"),
        0,
        "the ack should have emptied the outbox"
    );
}
