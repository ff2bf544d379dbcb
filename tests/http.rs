// tests/http.rs
//! Router-level integration coverage: `tower::ServiceExt::oneshot` against a
//! router built over an in-memory test state, `axum::body::to_bytes` to
//! read the response back out.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use dagchat::adapters::{AdapterRegistry, EchoAdapter};
use dagchat::api::http;
use dagchat::state::AppState;
use dagchat::store::{ConversationStore, MessageStore, SqliteConversationStore, SqliteMessageStore};

async fn test_app() -> axum::Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    let conversation_store = SqliteConversationStore::new(pool.clone());
    conversation_store.migrate().await.unwrap();
    let message_store = SqliteMessageStore::new(pool);
    message_store.migrate().await.unwrap();

    let conversations: Arc<dyn ConversationStore> = Arc::new(conversation_store);
    let messages: Arc<dyn MessageStore> = Arc::new(message_store);
    let adapters = Arc::new(AdapterRegistry::new(vec![Arc::new(EchoAdapter::new())]));

    let state = Arc::new(AppState::new(conversations, messages, adapters));
    http::router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok_outside_the_envelope() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn models_lists_the_registered_echo_adapter() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/api/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["code"], 0);
    let models = body["data"]["models"].as_array().unwrap();
    assert!(models.iter().any(|m| m["name"] == "echo"));
}

#[tokio::test]
async fn create_conversation_rejects_an_unknown_model() {
    let app = test_app().await;
    let request = json!({ "user_id": "u1", "model": "not-a-real-model", "message": "hi" });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/create-conversation")
                .header("content-type", "application/json")
                .body(Body::from(request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_ne!(body["code"], 0);
}

/// Full lifecycle: create -> chat (reads the whole conversation back out of
/// the SSE body) -> history -> rename -> list -> delete -> history 404s.
#[tokio::test]
async fn conversation_lifecycle_round_trips_through_the_router() {
    let app = test_app().await;

    let create_request = json!({ "user_id": "u1", "model": "echo", "message": "hello" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/create-conversation")
                .header("content-type", "application/json")
                .body(Body::from(create_request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let conversation_id = body["data"]["conversation_id"].as_str().unwrap().to_string();

    let chat_request = json!({
        "conversation_id": conversation_id,
        "user_id": "u1",
        "model": "echo",
        "message": "what is up",
        "parent_ids": [],
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/chat")
                .header("content-type", "application/json")
                .body(Body::from(chat_request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let sse_text = String::from_utf8(bytes.to_vec()).unwrap();

    // Each SSE frame is `data: {json}\n\n`; pull out every JSON payload.
    let frames: Vec<Value> = sse_text
        .split("\n\n")
        .filter_map(|chunk| chunk.strip_prefix("data: "))
        .filter(|data| !data.is_empty())
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert!(frames.iter().any(|f| f.get("user_message_id").is_some()));
    assert!(frames.iter().any(|f| f.get("content").is_some()));
    assert!(frames.iter().any(|f| f.get("complete") == Some(&Value::Bool(true))));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/dialogue/history?dialogue_id={conversation_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let nodes = body["data"].as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().any(|n| n["role"] == "user"));
    assert!(nodes.iter().any(|n| n["role"] == "assistant"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!(
                    "/api/v1/dialogue/rename?conversation_id={conversation_id}&user_id=u1&new_title=renamed"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["code"], 0);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/dialogue/list?user_id=u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["list"][0]["title"], "renamed");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/dialogue/delete?conversation_id={conversation_id}&user_id=u1"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["code"], 0);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/dialogue/history?dialogue_id={conversation_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_ne!(body["code"], 0);
}

#[tokio::test]
async fn delete_by_a_different_user_is_rejected_and_messages_survive() {
    let app = test_app().await;

    let create_request = json!({ "user_id": "owner", "model": "echo", "message": "hi" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/create-conversation")
                .header("content-type", "application/json")
                .body(Body::from(create_request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    let conversation_id = body["data"]["conversation_id"].as_str().unwrap().to_string();

    let chat_request = json!({
        "conversation_id": conversation_id,
        "user_id": "owner",
        "model": "echo",
        "message": "hi",
        "parent_ids": [],
    });
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/chat")
                .header("content-type", "application/json")
                .body(Body::from(chat_request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    // An intruder passing the right conversation_id but the wrong user_id
    // must not be able to delete the owner's messages.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!(
                    "/api/v1/dialogue/delete?conversation_id={conversation_id}&user_id=intruder"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_ne!(body["code"], 0);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/dialogue/history?dialogue_id={conversation_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["code"], 0);
    let nodes = body["data"].as_array().unwrap();
    assert_eq!(nodes.len(), 2, "intruder's rejected delete must not have removed the messages");
}

#[tokio::test]
async fn rename_by_a_different_user_is_rejected() {
    let app = test_app().await;

    let create_request = json!({ "user_id": "owner", "model": "echo", "message": "hi" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/create-conversation")
                .header("content-type", "application/json")
                .body(Body::from(create_request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    let conversation_id = body["data"]["conversation_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!(
                    "/api/v1/dialogue/rename?conversation_id={conversation_id}&user_id=intruder&new_title=hijacked"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_ne!(body["code"], 0);
}
