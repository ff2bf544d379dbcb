// src/state.rs
//! Process-wide shared state: the two stores and the adapter registry, each
//! already internally `Arc`'d and thread-safe, put behind one `Arc<AppState>`
//! and cloned into the router.

use std::sync::Arc;

use crate::adapters::AdapterRegistry;
use crate::orchestrator::ChatOrchestrator;
use crate::store::{ConversationStore, MessageStore};

#[derive(Clone)]
pub struct AppState {
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
    pub adapters: Arc<AdapterRegistry>,
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        let orchestrator = Arc::new(ChatOrchestrator::new(
            conversations.clone(),
            messages.clone(),
            adapters.clone(),
        ));
        Self { conversations, messages, adapters, orchestrator }
    }
}
