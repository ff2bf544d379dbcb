// src/adapters/echo.rs
//! Deterministic adapter with no external dependency, used as the registry
//! fallback when no provider key is configured and in orchestrator tests.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ChatEvent, ChatOptions, ModelAdapter, ModelCapabilities, ModelInfo};
use crate::dag::HistoryMessage;

pub const ECHO_MODEL: &str = "echo";

pub struct EchoAdapter;

impl EchoAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EchoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelAdapter for EchoAdapter {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn supports_model(&self, model: &str) -> bool {
        model == ECHO_MODEL
    }

    fn model_info(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            name: ECHO_MODEL.to_string(),
            display_name: "Echo (offline)".to_string(),
            capabilities: ModelCapabilities { deep_thinking: true, search: false },
        }]
    }

    async fn stream(
        &self,
        _history: &[HistoryMessage],
        prompt: &str,
        options: &ChatOptions,
        tx: mpsc::Sender<ChatEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        if options.deep_thinking {
            let _ = tx
                .send(ChatEvent::Reasoning { text: format!("thinking about: {prompt}") })
                .await;
        }

        let reply = format!("echo: {prompt}");
        for word in reply.split_inclusive(' ') {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let _ = tx.send(ChatEvent::Content { text: word.to_string() }).await;
        }

        let _ = tx.send(ChatEvent::Done).await;
        Ok(())
    }
}
