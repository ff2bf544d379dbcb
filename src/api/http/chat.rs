// src/api/http/chat.rs
//! SSE transport, bridging the orchestrator's `OrchestratorEvent`s onto the
//! wire: an `mpsc::channel` fed by a spawned task, drained through
//! `async_stream::stream!` into `Sse::new(..).keep_alive(..)`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{ChatRequest, OrchestratorEvent};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequestBody {
    pub conversation_id: String,
    pub user_id: String,
    pub model: String,
    pub message: String,
    #[serde(default)]
    pub parent_ids: Vec<String>,
    #[serde(default)]
    pub deep_thinking: bool,
    #[serde(default)]
    pub search_enabled: bool,
}

/// `POST /api/v1/chat`. Validates before opening the stream, so a bad
/// request is a plain JSON envelope error, not an SSE frame, then hands off
/// to `ChatOrchestrator::run` on a detached task, draining its events into
/// `Event`s as they arrive.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequestBody>,
) -> axum::response::Response {
    let req = ChatRequest {
        conversation_id: body.conversation_id,
        user_id: body.user_id,
        model: body.model,
        message: body.message,
        parent_ids: body.parent_ids,
        deep_thinking: body.deep_thinking,
        search_enabled: body.search_enabled,
    };

    let adapter = match state.orchestrator.validate(&req).await {
        Ok(adapter) => adapter,
        Err(e) => return e.into_response(),
    };

    let (tx, mut rx) = mpsc::channel::<OrchestratorEvent>(100);
    let cancel = CancellationToken::new();

    let orchestrator = state.orchestrator.clone();
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        orchestrator.run(req, adapter, tx, run_cancel).await;
    });

    // Dropping the stream (client disconnect) drops `rx`, which makes every
    // subsequent `tx.send` in `run` fail -- that failure is how the
    // orchestrator's drain loop notices the disconnect and cancels.
    let event_stream = stream! {
        while let Some(event) = rx.recv().await {
            let payload = match event {
                OrchestratorEvent::UserMessageId(id) => {
                    serde_json::json!({ "user_message_id": id })
                }
                OrchestratorEvent::Reasoning(text) => serde_json::json!({ "reasoning": text }),
                OrchestratorEvent::Content(text) => serde_json::json!({ "content": text }),
                OrchestratorEvent::Complete { message_id } => {
                    serde_json::json!({ "message_id": message_id, "complete": true })
                }
                OrchestratorEvent::Error(message) => serde_json::json!({ "error": message }),
            };
            let data = serde_json::to_string(&payload).unwrap_or_default();
            yield Ok::<Event, Infallible>(Event::default().data(data));
        }
    };

    Sse::new(event_stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text(": ping"))
        .into_response()
}
