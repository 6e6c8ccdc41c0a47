mod common;

use std::sync::Arc;
use std::time::Duration;

use quiz_api::db::kv::MemoryStore;
use serde_json::json;

use common::{connect, join, recv, recv_type, recv_within, send};

const QUIET: Duration = Duration::from_millis(300);

/// Two instances sharing one store, each serving its own clients.
async fn cluster() -> (quiz_api::AppState, quiz_api::AppState) {
    let kv = Arc::new(MemoryStore::new());
    let a = common::test_state_with(kv.clone(), "inst_a").await;
    let b = common::test_state_with(kv, "inst_b").await;
    (a, b)
}

#[tokio::test]
async fn answer_on_one_instance_reaches_clients_on_another() {
    let (a, b) = cluster().await;
    let addr_a = common::start_server(&a).await;
    let addr_b = common::start_server(&b).await;
    let quiz = a.sessions.create_quiz("Geo").await.unwrap();

    let mut alice = connect(addr_a).await;
    let mut bob = connect(addr_b).await;
    join(&mut alice, &quiz.id, "Alice").await;
    join(&mut bob, &quiz.id, "Bob").await;

    // Bob's join on B is relayed to Alice on A.
    let joined = recv_type(&mut alice, "user_joined").await;
    assert_eq!(joined["payload"]["name"], "Bob");

    send(
        &mut alice,
        json!({"type": "submit_answer", "payload": {"question_id": "q1", "answer": 0}}),
    )
    .await;

    let score = recv_type(&mut bob, "score_update").await;
    assert_eq!(score["payload"]["name"], "Alice");
    assert_eq!(score["payload"]["score"], 10);
    let board = recv(&mut bob).await;
    assert_eq!(board["type"], "leaderboard_update");
    assert_eq!(board["payload"][0]["name"], "Alice");
    assert_eq!(board["payload"][0]["score"], 10);

    // B's cache converged with the store.
    let board_b = b.sessions.leaderboard(&quiz.id).await.unwrap();
    assert_eq!(board_b[0].name, "Alice");
    assert_eq!(board_b[0].score, 10);
}

#[tokio::test]
async fn originating_instance_delivers_each_event_once() {
    let (a, _b) = cluster().await;
    let addr_a = common::start_server(&a).await;
    let quiz = a.sessions.create_quiz("Geo").await.unwrap();

    let mut host = connect(addr_a).await;
    join(&mut host, &quiz.id, "Host").await;

    send(&mut host, json!({"type": "start_quiz", "payload": {}})).await;
    recv_type(&mut host, "quiz_started").await;

    // The relayed copy of our own event must not arrive a second time.
    assert!(recv_within(&mut host, QUIET).await.is_none());
}

#[tokio::test]
async fn lifecycle_events_cross_instances() {
    let (a, b) = cluster().await;
    let addr_a = common::start_server(&a).await;
    let addr_b = common::start_server(&b).await;
    let quiz = a.sessions.create_quiz("Geo").await.unwrap();

    let mut host = connect(addr_a).await;
    let mut player = connect(addr_b).await;
    join(&mut host, &quiz.id, "Host").await;
    let player_id = join(&mut player, &quiz.id, "Player").await;

    send(&mut host, json!({"type": "start_quiz", "payload": {}})).await;
    let started = recv_type(&mut player, "quiz_started").await;
    assert_eq!(started["payload"]["quiz_id"], quiz.id.as_str());

    send(&mut host, json!({"type": "end_quiz", "payload": {}})).await;
    recv_type(&mut player, "quiz_ended").await;

    // B refreshed its copy, so it refuses answers after the end.
    let err = b
        .sessions
        .submit_answer(&quiz.id, &player_id, "q1", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, quiz_api::error::QuizError::InvalidState(_)));
}

#[tokio::test]
async fn delete_evicts_remote_caches() {
    let (a, b) = cluster().await;
    let addr_b = common::start_server(&b).await;
    let quiz = a.sessions.create_quiz("Geo").await.unwrap();

    let mut player = connect(addr_b).await;
    join(&mut player, &quiz.id, "Player").await;

    quiz_api::actions::delete_quiz(&a, &quiz.id).await;

    let deleted = recv_type(&mut player, "quiz_deleted").await;
    assert_eq!(deleted["payload"]["quiz_id"], quiz.id.as_str());
    assert!(b.sessions.get_quiz(&quiz.id).await.is_err());
}

#[tokio::test]
async fn concurrent_joins_on_two_instances_converge() {
    let (a, b) = cluster().await;
    let addr_a = common::start_server(&a).await;
    let addr_b = common::start_server(&b).await;
    let quiz = a.sessions.create_quiz("Geo").await.unwrap();
    b.sessions.get_quiz(&quiz.id).await.unwrap();

    let mut alice = connect(addr_a).await;
    let mut bob = connect(addr_b).await;
    let alice_id = join(&mut alice, &quiz.id, "Alice").await;
    let bob_id = join(&mut bob, &quiz.id, "Bob").await;
    recv_type(&mut alice, "user_joined").await;

    send(
        &mut alice,
        json!({"type": "submit_answer", "payload": {"question_id": "q1", "answer": 0}}),
    )
    .await;
    recv_type(&mut alice, "answer_submitted").await;
    recv_type(&mut bob, "score_update").await;

    for state in [&a, &b] {
        let participants = state.sessions.get_quiz(&quiz.id).await.unwrap().participants;
        assert!(participants.contains_key(&alice_id));
        assert!(participants.contains_key(&bob_id));
        assert_eq!(participants[&alice_id].score, 10);
    }

    // A retry routed to the other instance is still refused.
    let err = b
        .sessions
        .submit_answer(&quiz.id, &alice_id, "q1", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, quiz_api::error::QuizError::Conflict(_)));
}
