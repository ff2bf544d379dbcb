// src/api/http/mod.rs
//! HTTP router composition: one `Router<Arc<AppState>>` built with
//! `.route(...)` calls then `.with_state(...)`.

mod chat;
mod conversations;
mod health;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/create-conversation", post(conversations::create_conversation))
        .route("/api/v1/chat", post(chat::chat))
        .route("/api/v1/dialogue/list", get(conversations::list_dialogues))
        .route("/api/v1/dialogue/history", get(conversations::dialogue_history))
        .route("/api/v1/dialogue/rename", put(conversations::rename_dialogue))
        .route("/api/v1/dialogue/delete", axum::routing::delete(conversations::delete_dialogue))
        .route("/api/v1/models", get(conversations::list_models))
        .with_state(state)
}
