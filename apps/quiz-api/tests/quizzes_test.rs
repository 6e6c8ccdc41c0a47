mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

async fn server() -> (TestServer, quiz_api::AppState) {
    let state = common::test_state().await;
    let server = TestServer::new(common::test_app(&state)).unwrap();
    (server, state)
}

async fn create_quiz(server: &TestServer, title: &str) -> String {
    let resp = server.post("/api/v1/quizzes").json(&json!({ "title": title })).await;
    resp.assert_status(StatusCode::CREATED);
    let body: Value = resp.json();
    body["id"].as_str().unwrap().to_string()
}

async fn join(server: &TestServer, quiz_id: &str, name: &str) -> String {
    let resp = server
        .post("/api/v1/quizzes/join")
        .json(&json!({ "quiz_id": quiz_id, "name": name }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    body["id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Create / get / list / delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_quiz_returns_waiting_quiz_with_question_bank() {
    let (server, _state) = server().await;

    let resp = server.post("/api/v1/quizzes").json(&json!({ "title": "Geo" })).await;
    resp.assert_status(StatusCode::CREATED);
    let body: Value = resp.json();

    assert!(body["id"].as_str().unwrap().starts_with("quiz_"));
    assert_eq!(body["title"], "Geo");
    assert_eq!(body["status"], "waiting");
    assert_eq!(body["questions"].as_array().unwrap().len(), 5);
    assert!(body["participants"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn create_quiz_rejects_blank_title() {
    let (server, _state) = server().await;

    let resp = server.post("/api/v1/quizzes").json(&json!({ "title": "   " })).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"][0]["field"], "title");
}

#[tokio::test]
async fn get_unknown_quiz_is_not_found() {
    let (server, _state) = server().await;

    let resp = server.get("/api/v1/quizzes/quiz_missing").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_returns_quizzes_oldest_first() {
    let (server, _state) = server().await;
    let first = create_quiz(&server, "First").await;
    let second = create_quiz(&server, "Second").await;

    let body: Value = server.get("/api/v1/quizzes").await.json();
    assert_eq!(body["count"], 2);
    assert_eq!(body["quizzes"][0]["id"], first);
    assert_eq!(body["quizzes"][1]["id"], second);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (server, _state) = server().await;
    let quiz_id = create_quiz(&server, "Gone").await;

    server
        .delete(&format!("/api/v1/quizzes/{quiz_id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .delete(&format!("/api/v1/quizzes/{quiz_id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/v1/quizzes/{quiz_id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Join / answer / leaderboard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn geo_scenario_over_http() {
    let (server, _state) = server().await;
    let quiz_id = create_quiz(&server, "Geo").await;
    let alice = join(&server, &quiz_id, "Alice").await;
    let bob = join(&server, &quiz_id, "Bob").await;

    server
        .post(&format!("/api/v1/quizzes/{quiz_id}/start"))
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/v1/quizzes/answer")
        .add_query_param("user_id", &alice)
        .json(&json!({ "quiz_id": quiz_id, "question_id": "q1", "answer": 0 }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["answer"]["correct"], true);
    assert_eq!(body["score"], 10);

    server
        .post("/api/v1/quizzes/answer")
        .add_header("x-user-id", bob.as_str())
        .json(&json!({ "quiz_id": quiz_id, "question_id": "q1", "answer": 1 }))
        .await
        .assert_status_ok();

    let board: Value = server
        .get(&format!("/api/v1/quizzes/{quiz_id}/leaderboard"))
        .await
        .json();
    assert_eq!(board[0]["name"], "Alice");
    assert_eq!(board[0]["score"], 10);
    assert_eq!(board[0]["rank"], 1);
    assert_eq!(board[1]["name"], "Bob");
    assert_eq!(board[1]["score"], 0);
    assert_eq!(board[1]["rank"], 2);
}

#[tokio::test]
async fn duplicate_answer_conflicts() {
    let (server, _state) = server().await;
    let quiz_id = create_quiz(&server, "Geo").await;
    let alice = join(&server, &quiz_id, "Alice").await;
    let answer = json!({ "quiz_id": quiz_id, "question_id": "q1", "answer": 0 });

    server
        .post("/api/v1/quizzes/answer")
        .add_query_param("user_id", &alice)
        .json(&answer)
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/v1/quizzes/answer")
        .add_query_param("user_id", &alice)
        .json(&answer)
        .await;
    resp.assert_status(StatusCode::CONFLICT);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "CONFLICT");

    let user: Value = server.get(&format!("/api/v1/users/{alice}")).await.json();
    assert_eq!(user["score"], 10);
}

#[tokio::test]
async fn answer_requires_user_id() {
    let (server, _state) = server().await;
    let quiz_id = create_quiz(&server, "Geo").await;

    let resp = server
        .post("/api/v1/quizzes/answer")
        .json(&json!({ "quiz_id": quiz_id, "question_id": "q1", "answer": 0 }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_question_and_user_are_not_found() {
    let (server, _state) = server().await;
    let quiz_id = create_quiz(&server, "Geo").await;
    let alice = join(&server, &quiz_id, "Alice").await;

    server
        .post("/api/v1/quizzes/answer")
        .add_query_param("user_id", &alice)
        .json(&json!({ "quiz_id": quiz_id, "question_id": "q42", "answer": 0 }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    server
        .post("/api/v1/quizzes/answer")
        .add_query_param("user_id", "usr_nobody")
        .json(&json!({ "quiz_id": quiz_id, "question_id": "q1", "answer": 0 }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn join_unknown_quiz_is_not_found() {
    let (server, _state) = server().await;

    server
        .post("/api/v1/quizzes/join")
        .json(&json!({ "quiz_id": "quiz_missing", "name": "Alice" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lifecycle_transitions_only_move_forward() {
    let (server, _state) = server().await;
    let quiz_id = create_quiz(&server, "Geo").await;
    let alice = join(&server, &quiz_id, "Alice").await;

    let resp = server.post(&format!("/api/v1/quizzes/{quiz_id}/end")).await;
    resp.assert_status(StatusCode::CONFLICT);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "INVALID_STATE");

    server
        .post(&format!("/api/v1/quizzes/{quiz_id}/start"))
        .await
        .assert_status_ok();
    server
        .post(&format!("/api/v1/quizzes/{quiz_id}/start"))
        .await
        .assert_status(StatusCode::CONFLICT);

    let ended: Value = server
        .post(&format!("/api/v1/quizzes/{quiz_id}/end"))
        .await
        .json();
    assert!(ended["ended_at"].is_string());

    // Ending again is acknowledged without a new timestamp.
    let again = server.post(&format!("/api/v1/quizzes/{quiz_id}/end")).await;
    again.assert_status_ok();
    let again: Value = again.json();
    assert!(again.get("ended_at").is_none());

    server
        .post("/api/v1/quizzes/answer")
        .add_query_param("user_id", &alice)
        .json(&json!({ "quiz_id": quiz_id, "question_id": "q1", "answer": 0 }))
        .await
        .assert_status(StatusCode::CONFLICT);

    let quiz: Value = server.get(&format!("/api/v1/quizzes/{quiz_id}")).await.json();
    assert_eq!(quiz["status"], "ended");
}

// ---------------------------------------------------------------------------
// Stats / users / health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stats_summarize_answers() {
    let (server, _state) = server().await;
    let quiz_id = create_quiz(&server, "Geo").await;
    let alice = join(&server, &quiz_id, "Alice").await;
    join(&server, &quiz_id, "Bob").await;

    for (question_id, answer) in [("q1", 0), ("q2", 0)] {
        server
            .post("/api/v1/quizzes/answer")
            .add_query_param("user_id", &alice)
            .json(&json!({ "quiz_id": quiz_id, "question_id": question_id, "answer": answer }))
            .await
            .assert_status_ok();
    }

    let stats: Value = server
        .get(&format!("/api/v1/quizzes/{quiz_id}/stats"))
        .await
        .json();
    assert_eq!(stats["total_participants"], 2);
    assert_eq!(stats["total_questions"], 5);
    assert_eq!(stats["total_answers"], 2);
    assert_eq!(stats["correct_answers"], 1);
    assert_eq!(stats["accuracy_percent"], 50.0);
    assert_eq!(stats["total_score"], 10);
    assert_eq!(stats["average_score"], 5.0);
}

#[tokio::test]
async fn get_user_returns_participant() {
    let (server, _state) = server().await;
    let quiz_id = create_quiz(&server, "Geo").await;
    let alice = join(&server, &quiz_id, "Alice").await;

    let user: Value = server.get(&format!("/api/v1/users/{alice}")).await.json();
    assert_eq!(user["name"], "Alice");
    assert_eq!(user["score"], 0);

    server
        .get("/api/v1/users/usr_missing")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_store_and_counts() {
    let (server, state) = server().await;
    create_quiz(&server, "Geo").await;

    for path in ["/health", "/api/v1/health"] {
        let body: Value = server.get(path).await.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "connected");
        assert_eq!(body["instance_id"], state.config.instance_id.as_str());
        assert_eq!(body["quizzes"], 1);
        assert_eq!(body["clients"], 0);
    }
}

#[tokio::test]
async fn single_instance_mode_serves_from_memory() {
    let state = quiz_api::AppState::new(quiz_api::config::Config::default(), None);
    let server = TestServer::new(common::test_app(&state)).unwrap();

    let quiz_id = create_quiz(&server, "Offline").await;
    join(&server, &quiz_id, "Alice").await;

    let body: Value = server.get("/health").await.json();
    assert_eq!(body["store"], "disconnected");
    let board: Value = server
        .get(&format!("/api/v1/quizzes/{quiz_id}/leaderboard"))
        .await
        .json();
    assert_eq!(board.as_array().unwrap().len(), 1);
}
