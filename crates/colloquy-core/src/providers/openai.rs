//! OpenAI chat-completions provider (GPT-4, GPT-4o, etc.)
//!
//! Any endpoint speaking the same wire format works with a custom base URL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::error::ProviderError;
use super::types::{
    ChatMessage, ChatResponse, ChatRole, ChatUsage, DeltaCallback, LlmProvider, StopReason,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
        })
    }

    /// Convert provider-agnostic messages to OpenAI wire format
    fn to_openai_messages(messages: &[ChatMessage], system: &str) -> Vec<OpenAiMessage> {
        let mut result = Vec::with_capacity(messages.len() + 1);
        if !system.is_empty() {
            result.push(OpenAiMessage {
                role: ChatRole::System.to_string(),
                content: system.to_string(),
            });
        }
        result.extend(
            messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .map(|m| OpenAiMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                }),
        );
        result
    }

    fn request_body(&self, messages: &[ChatMessage], system: &str, stream: bool) -> serde_json::Value {
        let openai_messages = Self::to_openai_messages(messages, system);
        debug!(
            "OpenAI request: model={}, messages={}, stream={}",
            self.model,
            openai_messages.len(),
            stream
        );

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": openai_messages,
        });
        if stream {
            body["stream"] = serde_json::Value::Bool(true);
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<Response> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: self.provider_name().to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Status {
                provider: self.provider_name().to_string(),
                status: status.as_u16(),
                body: error_text,
            }
            .into());
        }
        Ok(response)
    }

    /// Convert OpenAI response to provider-agnostic format
    fn from_openai_response(resp: OpenAiApiResponse) -> Result<ChatResponse, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed {
                provider: "openai".to_string(),
                reason: "response had no choices".to_string(),
            })?;

        Ok(ChatResponse {
            text: choice.message.content.unwrap_or_default(),
            stop_reason: StopReason::from_finish_reason(choice.finish_reason.as_deref()),
            usage: resp.usage.map(ChatUsage::from).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage], system: &str) -> Result<ChatResponse> {
        let body = self.request_body(messages, system, false);
        let response = self.send(&body).await?;

        let api_response: OpenAiApiResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI API response")?;

        debug!(
            "OpenAI response: choices={}, finish_reason={:?}",
            api_response.choices.len(),
            api_response.choices.first().map(|c| &c.finish_reason)
        );

        Ok(Self::from_openai_response(api_response)?)
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        system: &str,
        on_delta: DeltaCallback<'_>,
    ) -> Result<ChatResponse> {
        let body = self.request_body(messages, system, true);
        let mut response = self.send(&body).await?;

        let mut decoder = SseDecoder::default();
        let mut acc = StreamAccumulator::default();

        let mut done = false;
        while let Some(bytes) = response
            .chunk()
            .await
            .context("Failed to read OpenAI stream")?
        {
            done = acc.consume(decoder.push(&bytes), on_delta)?;
            if done {
                break;
            }
        }
        // a last event without its trailing newline
        if !done {
            acc.consume(decoder.finish(), on_delta)?;
        }

        debug!(
            "OpenAI stream finished: {} chars, finish_reason={:?}",
            acc.text.len(),
            acc.finish_reason
        );
        Ok(acc.finish())
    }
}

/// One server-sent event carrying a chat-completion chunk
#[derive(Debug, Clone, PartialEq, Eq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Splits a byte stream into `data:` events, tolerating lines cut across chunks
#[derive(Debug, Default)]
struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            events.extend(Self::parse_line(&line));
        }
        events
    }

    /// Flush whatever is left once the byte stream has ended
    fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buf);
        Self::parse_line(&rest).into_iter().collect()
    }

    fn parse_line(line: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(line);
        // comments, event names and blank separators carry no data
        let payload = line.trim().strip_prefix("data:")?.trim();
        if payload == "[DONE]" {
            Some(SseEvent::Done)
        } else if payload.is_empty() {
            None
        } else {
            Some(SseEvent::Data(payload.to_string()))
        }
    }
}

/// Reassembles streamed chunks into a full response
#[derive(Debug, Default)]
struct StreamAccumulator {
    text: String,
    finish_reason: Option<String>,
    usage: ChatUsage,
}

impl StreamAccumulator {
    /// Fold one chunk in, returning any new text
    fn apply(&mut self, payload: &str) -> Result<Option<String>, ProviderError> {
        let chunk: OpenAiStreamChunk =
            serde_json::from_str(payload).map_err(|e| ProviderError::Malformed {
                provider: "openai".to_string(),
                reason: format!("bad stream chunk: {}", e),
            })?;

        if let Some(usage) = chunk.usage {
            self.usage = usage.into();
        }

        let mut fresh = String::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                fresh.push_str(&content);
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }

        if fresh.is_empty() {
            return Ok(None);
        }
        self.text.push_str(&fresh);
        Ok(Some(fresh))
    }

    /// Apply decoded events, forwarding new text. Returns true once `[DONE]` is seen.
    fn consume(
        &mut self,
        events: Vec<SseEvent>,
        on_delta: &mut (dyn FnMut(&str) + Send),
    ) -> Result<bool, ProviderError> {
        for event in events {
            match event {
                SseEvent::Done => return Ok(true),
                SseEvent::Data(payload) => {
                    if let Some(delta) = self.apply(&payload)? {
                        on_delta(&delta);
                    }
                }
            }
        }
        Ok(false)
    }

    fn finish(self) -> ChatResponse {
        ChatResponse {
            text: self.text,
            stop_reason: StopReason::from_finish_reason(self.finish_reason.as_deref()),
            usage: self.usage,
        }
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiApiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<OpenAiUsage> for ChatUsage {
    fn from(u: OpenAiUsage) -> Self {
        Self {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }
    }
}
