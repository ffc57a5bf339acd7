//! Provider-agnostic chat types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provider-agnostic chat message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Well-known chat model identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatModel {
    Gpt4,
    Gpt4o,
}

impl ChatModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt4 => "gpt-4",
            Self::Gpt4o => "gpt-4o",
        }
    }
}

impl std::fmt::Display for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response from an LLM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub stop_reason: StopReason,
    pub usage: ChatUsage,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    Unknown,
}

impl StopReason {
    pub fn from_finish_reason(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => Self::EndTurn,
            Some("length") => Self::MaxTokens,
            _ => Self::Unknown,
        }
    }
}

/// Token usage from one or more API calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ChatUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for ChatUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Callback receiving streamed text fragments
pub type DeltaCallback<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Trait that all LLM providers implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai")
    fn provider_name(&self) -> &str;

    /// Model identifier (e.g. "gpt-4")
    fn model(&self) -> &str;

    /// Send a chat request with a system prompt
    async fn chat(&self, messages: &[ChatMessage], system: &str) -> Result<ChatResponse>;

    /// Send a chat request, forwarding text to `on_delta` as it is generated.
    ///
    /// Providers without native streaming emit the whole reply as one delta.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        system: &str,
        on_delta: DeltaCallback<'_>,
    ) -> Result<ChatResponse> {
        let response = self.chat(messages, system).await?;
        on_delta(&response.text);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_display() {
        assert_eq!(ChatRole::User.to_string(), "user");
        assert_eq!(ChatRole::Assistant.to_string(), "assistant");
        assert_eq!(ChatRole::System.to_string(), "system");
    }

    #[test]
    fn test_chat_model_ids() {
        assert_eq!(ChatModel::Gpt4.as_str(), "gpt-4");
        assert_eq!(ChatModel::Gpt4o.to_string(), "gpt-4o");
    }

    #[test]
    fn test_stop_reason_from_finish_reason() {
        assert_eq!(StopReason::from_finish_reason(Some("stop")), StopReason::EndTurn);
        assert_eq!(StopReason::from_finish_reason(Some("length")), StopReason::MaxTokens);
        assert_eq!(StopReason::from_finish_reason(None), StopReason::Unknown);
    }

    #[test]
    fn test_usage_accumulates() {
        let mut usage = ChatUsage::default();
        usage += ChatUsage {
            input_tokens: 10,
            output_tokens: 5,
        };
        usage += ChatUsage {
            input_tokens: 1,
            output_tokens: 2,
        };
        assert_eq!(usage.input_tokens, 11);
        assert_eq!(usage.output_tokens, 7);
        assert_eq!(usage.total(), 18);
    }
}
