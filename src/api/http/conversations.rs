// src/api/http/conversations.rs
//! Conversation CRUD/list handlers: each body collects into an
//! `ApiResult<_>` and matches it into `into_response()` at the end.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::envelope::ApiEnvelope;
use crate::api::error::{retry_once, ApiError, ApiResult, IntoApiError, IntoApiErrorOption};
use crate::state::AppState;
use crate::store::{DeleteOutcome, Message};

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    pub user_id: String,
    pub model: String,
    /// Accepted for symmetry with the client's first-turn intent but not
    /// persisted here — the client calls `/chat` next to actually create the
    /// root message.
    #[allow(dead_code)]
    pub message: String,
}

#[derive(Serialize)]
pub struct CreateConversationResponse {
    pub conversation_id: String,
}

pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConversationRequest>,
) -> impl IntoResponse {
    let result: ApiResult<_> = async {
        if req.user_id.trim().is_empty() {
            return Err(ApiError::invalid_request("user_id must not be empty"));
        }
        if state.adapters.resolve(&req.model).is_none() {
            return Err(ApiError::unknown_model(format!("unknown model: {}", req.model)));
        }

        let convo = state
            .conversations
            .create(&req.user_id, &req.model)
            .await
            .into_store_error("failed to create conversation")?;

        info!("created conversation {} for user {}", convo.id, req.user_id);
        Ok(ApiEnvelope::ok(CreateConversationResponse { conversation_id: convo.id }))
    }
    .await;

    match result {
        Ok(response) => response.into_response(),
        Err(e) => {
            error!("create_conversation failed: {}", e.message);
            e.into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct ListDialogueQuery {
    pub user_id: String,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub models: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
pub struct ListDialogueResponse {
    pub list: Vec<ConversationSummary>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

pub async fn list_dialogues(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDialogueQuery>,
) -> impl IntoResponse {
    let result: ApiResult<_> = async {
        let page = query.page.unwrap_or(1);
        let page_size = query.page_size.unwrap_or(20);

        let (items, total) = retry_once(|| state.conversations.list(&query.user_id, page, page_size))
            .await
            .into_store_error("failed to list conversations")?;

        let list = items
            .into_iter()
            .map(|c| ConversationSummary {
                id: c.id,
                title: c.title,
                models: c.models,
                created_at: c.created_at,
                updated_at: c.updated_at,
            })
            .collect();

        Ok(ApiEnvelope::ok(ListDialogueResponse { list, total, page, page_size }))
    }
    .await;

    match result {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct DialogueHistoryQuery {
    pub dialogue_id: String,
}

#[derive(Serialize)]
pub struct HistoryNode {
    pub id: String,
    pub role: String,
    pub content: String,
    pub reasoning: Option<String>,
    pub model: Option<String>,
    pub parent_ids: Vec<String>,
    pub children: Vec<String>,
}

impl From<Message> for HistoryNode {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            reasoning: m.reasoning,
            model: m.model,
            parent_ids: m.parent_ids.into_iter().collect(),
            children: m.children.into_iter().collect(),
        }
    }
}

/// Flat node listing for client-side DAG rebuilding: every message in the
/// conversation, in insertion order, with both edge sets so the client can
/// reconstruct branches and merges itself.
pub async fn dialogue_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DialogueHistoryQuery>,
) -> impl IntoResponse {
    let result: ApiResult<_> = async {
        retry_once(|| state.conversations.get(&query.dialogue_id))
            .await
            .into_store_error("failed to look up conversation")?
            .ok_or_unknown_conversation("conversation not found")?;

        let nodes = retry_once(|| state.messages.get_by_conversation(&query.dialogue_id))
            .await
            .into_store_error("failed to fetch conversation history")?;

        let data: Vec<HistoryNode> = nodes.into_iter().map(HistoryNode::from).collect();
        Ok(ApiEnvelope::ok(data))
    }
    .await;

    match result {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct RenameDialogueQuery {
    pub conversation_id: String,
    pub user_id: String,
    pub new_title: String,
}

pub async fn rename_dialogue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RenameDialogueQuery>,
) -> impl IntoResponse {
    let result: ApiResult<_> = async {
        let renamed = state
            .conversations
            .rename(&query.conversation_id, &query.user_id, &query.new_title)
            .await
            .into_api_error(
                crate::api::error::ErrorKind::InvalidRequest,
                "invalid or unauthorized rename",
            )?;

        if !renamed {
            return Err(ApiError::unknown_conversation(
                "conversation not found or not owned by user_id",
            ));
        }

        Ok(ApiEnvelope::ok(()))
    }
    .await;

    match result {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct DeleteDialogueQuery {
    pub conversation_id: String,
    pub user_id: String,
}

/// Cascades to the conversation's messages. Ownership is checked before any
/// deletion happens, so a wrong `user_id` can't wipe another user's messages
/// even though the conversation row delete (scoped by `(id, user_id)`) would
/// separately fail. If message deletion then fails the conversation row is
/// retained so a retry can complete the cascade — atomic from the client's
/// perspective even though it's two statements.
pub async fn delete_dialogue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteDialogueQuery>,
) -> impl IntoResponse {
    let result: ApiResult<_> = async {
        let convo = state
            .conversations
            .get(&query.conversation_id)
            .await
            .into_store_error("failed to look up conversation")?
            .ok_or_unknown_conversation("conversation not found or not owned by user_id")?;

        if convo.user_id != query.user_id {
            return Err(ApiError::unknown_conversation(
                "conversation not found or not owned by user_id",
            ));
        }

        state
            .messages
            .delete_by_conversation(&query.conversation_id)
            .await
            .into_store_error("failed to delete conversation messages")?;

        let outcome = state
            .conversations
            .delete(&query.conversation_id, &query.user_id)
            .await
            .into_store_error("failed to delete conversation")?;

        match outcome {
            DeleteOutcome::Deleted => Ok(ApiEnvelope::ok(())),
            DeleteOutcome::NotFound => {
                Err(ApiError::unknown_conversation("conversation not found or not owned by user_id"))
            }
        }
    }
    .await;

    match result {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub models: Vec<crate::adapters::ModelInfo>,
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ApiEnvelope::ok(ModelsResponse { models: state.adapters.list_models() })
}
