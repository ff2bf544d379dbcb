// src/orchestrator.rs
//! The chat orchestrator: validate a request, persist the user node, invoke
//! a model adapter, interleave SSE token emission with the final dual-write,
//! and keep the DAG's question/answer atomicity invariant intact across
//! cancellation and adapter errors.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::adapters::{AdapterRegistry, ChatEvent, ChatOptions, ModelAdapter};
use crate::api::error::{ApiError, ApiResult, IntoApiError, IntoApiErrorOption};
use crate::config::CONFIG;
use crate::dag::build_history;
use crate::store::{ConversationStore, MessageStore, NewMessage, Role};

/// Request shape of `POST /chat`.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub conversation_id: String,
    pub user_id: String,
    pub model: String,
    pub message: String,
    pub parent_ids: Vec<String>,
    pub deep_thinking: bool,
    pub search_enabled: bool,
}

/// Events the orchestrator emits on its own channel, one-to-one with the SSE
/// frames the client sees: `user_message_id` once early, `reasoning`/
/// `content` any number of times, then exactly one of `complete`/`error`.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    UserMessageId(String),
    Reasoning(String),
    Content(String),
    Complete { message_id: String },
    Error(String),
}

pub struct ChatOrchestrator {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    adapters: Arc<AdapterRegistry>,
}

impl ChatOrchestrator {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        Self { conversations, messages, adapters }
    }

    /// Validates the model and reconciles the parent set before any SSE
    /// bytes are sent, so a bad request still gets a plain JSON envelope
    /// instead of an SSE stream that immediately errors.
    pub async fn validate(&self, req: &ChatRequest) -> ApiResult<Arc<dyn ModelAdapter>> {
        if req.message.trim().is_empty() {
            return Err(ApiError::invalid_request("message must not be empty"));
        }

        let adapter = self
            .adapters
            .resolve(&req.model)
            .ok_or_else(|| ApiError::unknown_model(format!("unknown model: {}", req.model)))?;

        // Invariant 2 (single root): `parent_ids = []` only means "first
        // question" if the conversation has no messages yet. Without this
        // check, a second root-level `/chat` call against an existing
        // conversation would insert a second parentless user node.
        if req.parent_ids.is_empty() {
            let existing = self
                .messages
                .get_by_conversation(&req.conversation_id)
                .await
                .into_store_error("failed to check for an existing conversation root")?;
            if !existing.is_empty() {
                return Err(ApiError::invalid_request(
                    "conversation already has a root message; parent_ids must not be empty",
                ));
            }
        }

        for parent_id in &req.parent_ids {
            let parent = self
                .messages
                .get(parent_id)
                .await
                .into_store_error("failed to fetch parent message")?
                .ok_or_unknown_message(&format!("parent message not found: {parent_id}"))?;

            if parent.conversation_id != req.conversation_id {
                return Err(ApiError::invalid_request(
                    "parent message does not belong to this conversation",
                ));
            }
        }

        Ok(adapter)
    }

    /// Runs for the lifetime of the SSE response body. Never returns an
    /// error to the caller — every failure mode is surfaced as an
    /// `OrchestratorEvent::Error` frame, or silently dropped once the client
    /// is already gone.
    pub async fn run(
        &self,
        req: ChatRequest,
        adapter: Arc<dyn ModelAdapter>,
        tx: mpsc::Sender<OrchestratorEvent>,
        cancel: CancellationToken,
    ) {
        let history = match build_history(&req.parent_ids, self.messages.as_ref()).await {
            Ok(h) => h,
            Err(e) => {
                error!("build_history failed for {}: {e:?}", req.conversation_id);
                let _ = tx
                    .send(OrchestratorEvent::Error(format!(
                        "failed to reconstruct conversation history: {e}"
                    )))
                    .await;
                return;
            }
        };

        // Persist the user node before any model call, so the user's
        // question survives even if the adapter never answers — it is
        // retained unconditionally regardless of what happens downstream.
        let parent_ids: BTreeSet<String> = req.parent_ids.iter().cloned().collect();
        let user_node = NewMessage {
            conversation_id: req.conversation_id.clone(),
            role: Role::User.as_str().to_string(),
            content: req.message.clone(),
            reasoning: None,
            model: None,
            parent_ids: parent_ids.clone(),
        };

        let user_message_id = match self.messages.insert(user_node).await {
            Ok(id) => id,
            Err(e) => {
                error!("failed to persist user node: {e:?}");
                let _ = tx
                    .send(OrchestratorEvent::Error("failed to persist your message".to_string()))
                    .await;
                return;
            }
        };

        for parent_id in &parent_ids {
            if let Err(e) = self.messages.append_child(parent_id, &user_message_id).await {
                // The node is already durable and reachable by id, just
                // missing from this one parent's children set. Logged
                // loudly; not fatal to the request.
                error!(
                    "append_child({parent_id}, {user_message_id}) failed (PartialWrite): {e:?}"
                );
            }
        }

        if tx.send(OrchestratorEvent::UserMessageId(user_message_id.clone())).await.is_err() {
            return;
        }

        // Invoke the adapter on its own task so we can select over its
        // events and our own cancellation/idle-timeout concurrently.
        let (adapter_tx, adapter_rx) = mpsc::channel::<ChatEvent>(64);
        let options = ChatOptions {
            model: req.model.clone(),
            system: None,
            deep_thinking: req.deep_thinking,
            search_enabled: req.search_enabled,
            temperature: None,
            max_tokens: None,
        };

        let adapter_clone = adapter.clone();
        let history_clone = history.clone();
        let prompt = req.message.clone();
        let adapter_cancel = cancel.clone();
        let adapter_task = tokio::spawn(async move {
            adapter_clone.stream(&history_clone, &prompt, &options, adapter_tx, adapter_cancel).await
        });

        let (reasoning, content, failed) =
            match timeout(CONFIG.chat_total_timeout, self.drain(adapter_rx, &tx, &cancel)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        "chat request for {} exceeded total timeout of {:?}",
                        req.conversation_id, CONFIG.chat_total_timeout
                    );
                    cancel.cancel();
                    let _ = tx
                        .send(OrchestratorEvent::Error("the model took too long to respond".to_string()))
                        .await;
                    (String::new(), String::new(), true)
                }
            };

        // The adapter task observes `cancel` cooperatively and closes its
        // upstream connection; join it so its own request-scope state (e.g.
        // the reqwest response body) is dropped before we return.
        match adapter_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if !failed => {
                error!("adapter error for {}: {e:?}", req.conversation_id);
                let _ = tx.send(OrchestratorEvent::Error(e.to_string())).await;
            }
            Ok(Err(_)) => {} // already reported via drain/timeout path
            Err(join_err) => error!("adapter task panicked: {join_err:?}"),
        }

        // Discard partial content on cancellation or error rather than
        // persisting a half-written reply: an assistant node only ever
        // exists with full content and exactly one parent.
        if cancel.is_cancelled() || failed {
            return;
        }

        // Finalize: persist the assistant node and wire up its edges.
        let assistant_parent_ids: BTreeSet<String> = std::iter::once(user_message_id.clone()).collect();
        let assistant_node = NewMessage {
            conversation_id: req.conversation_id.clone(),
            role: Role::Assistant.as_str().to_string(),
            content: content.clone(),
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            model: Some(req.model.clone()),
            parent_ids: assistant_parent_ids,
        };

        let assistant_id = match self.messages.insert(assistant_node).await {
            Ok(id) => id,
            Err(e) => {
                error!("failed to persist assistant node: {e:?}");
                let _ = tx
                    .send(OrchestratorEvent::Error("failed to save the reply".to_string()))
                    .await;
                return;
            }
        };

        if let Err(e) = self.messages.append_child(&user_message_id, &assistant_id).await {
            error!("append_child({user_message_id}, {assistant_id}) failed (PartialWrite): {e:?}");
        }

        if let Err(e) = self.conversations.touch(&req.conversation_id, &req.model).await {
            error!("ConversationStore::touch failed for {}: {e:?}", req.conversation_id);
        }

        let _ = tx.send(OrchestratorEvent::Complete { message_id: assistant_id }).await;

        // Auto-title: only the very first Q/A in a conversation fires it,
        // and only if the conversation is still untitled; runs detached
        // from this request's lifetime.
        if req.parent_ids.is_empty() {
            self.spawn_auto_title(req.conversation_id.clone(), req.message.clone());
        }
    }

    /// Drains adapter events, forwarding each to `tx` and accumulating the
    /// reasoning/content buffers, honoring both the per-token idle timeout
    /// and the shared cancellation token. Returns `(reasoning, content,
    /// failed)`; `failed` covers adapter errors, idle timeout, or the client
    /// disconnecting (send failure).
    async fn drain(
        &self,
        mut adapter_rx: mpsc::Receiver<ChatEvent>,
        tx: &mpsc::Sender<OrchestratorEvent>,
        cancel: &CancellationToken,
    ) -> (String, String, bool) {
        let mut reasoning = String::new();
        let mut content = String::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return (reasoning, content, true),
                recv = timeout(CONFIG.chat_idle_timeout, adapter_rx.recv()) => {
                    match recv {
                        Ok(Some(ChatEvent::Reasoning { text })) => {
                            reasoning.push_str(&text);
                            if tx.send(OrchestratorEvent::Reasoning(text)).await.is_err() {
                                cancel.cancel();
                                return (reasoning, content, true);
                            }
                        }
                        Ok(Some(ChatEvent::Content { text })) => {
                            content.push_str(&text);
                            if tx.send(OrchestratorEvent::Content(text)).await.is_err() {
                                cancel.cancel();
                                return (reasoning, content, true);
                            }
                        }
                        Ok(Some(ChatEvent::Error { message })) => {
                            let _ = tx.send(OrchestratorEvent::Error(message)).await;
                            return (reasoning, content, true);
                        }
                        Ok(Some(ChatEvent::Done)) | Ok(None) => return (reasoning, content, false),
                        Err(_) => {
                            warn!("adapter idle timeout after {:?}", CONFIG.chat_idle_timeout);
                            cancel.cancel();
                            let _ = tx
                                .send(OrchestratorEvent::Error("model response timed out".to_string()))
                                .await;
                            return (reasoning, content, true);
                        }
                    }
                }
            }
        }
    }

    fn spawn_auto_title(&self, conversation_id: String, first_message: String) {
        let conversations = self.conversations.clone();
        let adapters = self.adapters.clone();

        tokio::spawn(async move {
            match conversations.get(&conversation_id).await {
                Ok(Some(convo)) if !convo.has_title() => {}
                Ok(_) => return,
                Err(e) => {
                    warn!("auto-title: failed to load conversation {conversation_id}: {e:?}");
                    return;
                }
            }

            let Some(adapter) = adapters.resolve(&CONFIG.default_model) else {
                warn!("auto-title: default model {} not registered", CONFIG.default_model);
                return;
            };

            let prompt = format!(
                "Summarize the following question in at most 16 characters, plain text, \
                 no punctuation or quotes: {first_message}"
            );
            let options = ChatOptions::new(CONFIG.default_model.clone());
            let (tx, mut rx) = mpsc::channel(16);
            let cancel = CancellationToken::new();

            let stream_result = adapter.stream(&[], &prompt, &options, tx, cancel).await;

            let mut title = String::new();
            while let Some(event) = rx.recv().await {
                if let ChatEvent::Content { text } = event {
                    title.push_str(&text);
                }
            }

            if stream_result.is_err() {
                warn!("auto-title: adapter stream failed for {conversation_id}");
                return;
            }

            let title: String = title.chars().filter(|c| !c.is_control()).take(16).collect();
            let title = title.trim().to_string();
            if title.is_empty() {
                return;
            }

            if let Err(e) = conversations.set_title(&conversation_id, &title).await {
                warn!("auto-title: set_title failed for {conversation_id}: {e:?}");
            }
        });
    }
}
