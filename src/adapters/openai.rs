// src/adapters/openai.rs
//! Adapter over OpenAI's Responses API: structured input items with
//! `instructions` carrying the system prompt, and a line-buffered `data: `
//! SSE parse loop pushing `ChatEvent`s as deltas arrive.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ChatEvent, ChatOptions, ModelAdapter, ModelCapabilities, ModelInfo};
use crate::dag::HistoryMessage;

const KNOWN_MODELS: &[(&str, &str)] = &[
    ("gpt-5.2", "GPT-5.2"),
    ("gpt-5.2-mini", "GPT-5.2 Mini"),
];

pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Ok(Self { client: Client::new(), api_key, base_url })
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponsesInputItem {
    Message { role: String, content: String },
}

#[derive(Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<ResponsesInputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    /// Requests OpenAI's reasoning summary; ignored by models that don't
    /// support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<ReasoningConfig>,
    stream: bool,
}

#[derive(Serialize)]
struct ReasoningConfig {
    summary: &'static str,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    text: Option<String>,
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
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
                capabilities: ModelCapabilities { deep_thinking: true, search: true },
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
        let mut items: Vec<ResponsesInputItem> = history
            .iter()
            .map(|m| ResponsesInputItem::Message { role: m.role.clone(), content: m.content.clone() })
            .collect();
        items.push(ResponsesInputItem::Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request = ResponsesRequest {
            model: options.model.clone(),
            input: items,
            instructions: options.system.clone(),
            temperature: options.temperature,
            max_output_tokens: options.max_tokens,
            reasoning: options.deep_thinking.then_some(ReasoningConfig { summary: "auto" }),
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/responses", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI Responses API error: {status} - {body}");
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        loop {
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

                if line.is_empty() || line == "data: [DONE]" {
                    continue;
                }

                let Some(json_str) = line.strip_prefix("data: ") else { continue };

                let Ok(event) = serde_json::from_str::<StreamEvent>(json_str) else { continue };
                let Some(text) = event.delta.and_then(|d| d.text) else { continue };

                if event.event_type == "response.reasoning_summary_text.delta" {
                    let _ = tx.send(ChatEvent::Reasoning { text }).await;
                } else {
                    let _ = tx.send(ChatEvent::Content { text }).await;
                }
            }
        }

        let _ = tx.send(ChatEvent::Done).await;
        Ok(())
    }
}
