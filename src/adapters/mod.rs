// src/adapters/mod.rs
//! A thin, uniform boundary over whatever upstream model API answers a
//! turn: a trait carrying name, capabilities, and a streaming call, plus
//! the event vocabulary a stream emits.

mod echo;
mod openai;
mod anthropic;

pub use echo::EchoAdapter;
pub use openai::OpenAiAdapter;
pub use anthropic::AnthropicAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dag::HistoryMessage;

/// Streaming event vocabulary an adapter emits while answering a turn:
/// `reasoning`, `content`, `done`, `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Incremental thinking token(s), only emitted when the adapter both
    /// supports and was asked for `deep_thinking`.
    Reasoning { text: String },
    /// Incremental answer token(s).
    Content { text: String },
    /// Terminal error.
    Error { message: String },
    /// Clean terminal marker.
    Done,
}

/// Per-turn knobs an adapter call needs beyond the history itself.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub system: Option<String>,
    /// Request a reasoning trace if the adapter supports one; silently
    /// ignored otherwise.
    pub deep_thinking: bool,
    /// Request live-search augmentation if the adapter supports it;
    /// silently ignored otherwise.
    pub search_enabled: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            deep_thinking: false,
            search_enabled: false,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// What a model can do beyond plain text-in/text-out, surfaced by `/models`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ModelCapabilities {
    pub deep_thinking: bool,
    pub search: bool,
}

/// One entry of the `/models` listing.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: String,
    pub capabilities: ModelCapabilities,
}

/// Uniform boundary over an upstream model API. `stream` pushes
/// `ChatEvent`s to `tx` as they arrive; the caller accumulates `reasoning`
/// and `content` text itself by draining `tx`, so `stream` itself only
/// reports success/failure. It must observe `cancel` and stop sending
/// without error if the caller drops interest mid-turn.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports_model(&self, model: &str) -> bool;

    /// Concrete models this adapter answers for, in preference order.
    fn model_info(&self) -> Vec<ModelInfo>;

    async fn stream(
        &self,
        history: &[HistoryMessage],
        prompt: &str,
        options: &ChatOptions,
        tx: mpsc::Sender<ChatEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()>;
}

/// Looks up the adapter responsible for a given model name. One adapter
/// may answer for several model ids.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn ModelAdapter>>,
}

impl AdapterRegistry {
    pub fn new(adapters: Vec<Arc<dyn ModelAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn resolve(&self, model: &str) -> Option<Arc<dyn ModelAdapter>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.supports_model(model))
            .cloned()
    }

    /// Built from environment-configured API keys, falling back to the echo
    /// adapter so the service is exercisable with zero external keys.
    pub fn from_env() -> Self {
        let mut adapters: Vec<Arc<dyn ModelAdapter>> = Vec::new();

        if let Ok(adapter) = OpenAiAdapter::from_env() {
            adapters.push(Arc::new(adapter));
        }
        if let Ok(adapter) = AnthropicAdapter::from_env() {
            adapters.push(Arc::new(adapter));
        }
        adapters.push(Arc::new(EchoAdapter::new()));

        Self::new(adapters)
    }

    /// Every model any registered adapter will answer for, in adapter
    /// registration order. Backs the `/models` endpoint.
    pub fn list_models(&self) -> Vec<ModelInfo> {
        let mut seen = HashMap::new();
        let mut out = Vec::new();
        for adapter in &self.adapters {
            for info in adapter.model_info() {
                if seen.insert(info.name.clone(), ()).is_none() {
                    out.push(info);
                }
            }
        }
        out
    }
}
