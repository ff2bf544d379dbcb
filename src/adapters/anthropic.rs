// src/adapters/anthropic.rs
//! Adapter over the Anthropic Messages API: `x-api-key`/`anthropic-version`
//! headers, `content_block_start`/`content_block_delta`/`content_block_stop`
//! event handling, tracking the current block kind so deltas from
//! non-text content blocks are ignored. `thinking` content blocks map to a
//! `reasoning` event when `deep_thinking` is requested.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ChatEvent, ChatOptions, ModelAdapter, ModelCapabilities, ModelInfo};
use crate::dag::HistoryMessage;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;

const KNOWN_MODELS: &[(&str, &str)] = &[
    ("claude-opus-4-5-20251101", "Claude Opus 4.5"),
    ("claude-sonnet-4-5", "Claude Sonnet 4.5"),
];

pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;
        let base_url = std::env::var("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string());
        Ok(Self { client: Client::new(), api_key, base_url })
    }
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<StreamDelta>,
    content_block: Option<ContentBlock>,
}

#[derive(Deserialize)]
struct StreamDelta {
    text: Option<String>,
    thinking: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum BlockKind {
    Other,
    Text,
    Thinking,
}

#[async_trait]
impl ModelAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn supports_model(&self, model: &str) -> bool {
        KNOWN_MODELS.iter().any(|(m, _)| *m == model)
    }

    fn model_info(&self) -> Vec<ModelInfo> {
        KNOWN_MODELS
            .iter()
            .map(|(name, display_name)| ModelInfo {
                name: name.to_string(),
                display_name: display_name.to_string(),
                capabilities: ModelCapabilities { deep_thinking: true, search: false },
            })
            .collect()
    }

    async fn stream(
        &self,
        history: &[HistoryMessage],
        prompt: &str,
        options: &ChatOptions,
        tx: mpsc::Sender<ChatEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut messages: Vec<AnthropicMessage> = history
            .iter()
            .map(|m| AnthropicMessage { role: m.role.clone(), content: m.content.clone() })
            .collect();
        messages.push(AnthropicMessage { role: "user".to_string(), content: prompt.to_string() });

        let max_tokens = options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let request = AnthropicRequest {
            model: options.model.clone(),
            max_tokens,
            messages,
            system: options.system.clone(),
            temperature: options.temperature,
            thinking: options
                .deep_thinking
                .then_some(ThinkingConfig { kind: "enabled", budget_tokens: max_tokens / 2 }),
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error: {status} - {body}");
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut current_block = BlockKind::Other;

        'outer: loop {
            let chunk_result = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = stream.next() => next,
            };
            let Some(chunk_result) = chunk_result else { break };

            let chunk = chunk_result?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() {
                    continue;
                }

                let Some(json_str) = line.strip_prefix("data: ") else { continue };

                let Ok(event) = serde_json::from_str::<StreamEvent>(json_str) else { continue };

                match event.event_type.as_str() {
                    "content_block_start" => {
                        current_block = match event.content_block.and_then(|b| b.block_type) {
                            Some(t) if t == "text" => BlockKind::Text,
                            Some(t) if t == "thinking" => BlockKind::Thinking,
                            _ => BlockKind::Other,
                        };
                    }
                    "content_block_delta" => {
                        let Some(delta) = event.delta else { continue };
                        match current_block {
                            BlockKind::Text => {
                                if let Some(text) = delta.text {
                                    let _ = tx.send(ChatEvent::Content { text }).await;
                                }
                            }
                            BlockKind::Thinking => {
                                if let Some(text) = delta.thinking {
                                    let _ = tx.send(ChatEvent::Reasoning { text }).await;
                                }
                            }
                            BlockKind::Other => {}
                        }
                    }
                    "content_block_stop" => current_block = BlockKind::Other,
                    "message_stop" => break 'outer,
                    _ => {}
                }
            }
        }

        let _ = tx.send(ChatEvent::Done).await;
        Ok(())
    }
}
