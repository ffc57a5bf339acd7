//! Scripted LLM for tests and offline runs.
//!
//! Replies either come from a fixed queue, consumed one per call, or are
//! computed from the request by a closure. Every request is recorded so tests
//! can assert on what an agent actually sent.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::error::ProviderError;
use super::types::{ChatMessage, ChatResponse, ChatUsage, LlmProvider, StopReason};

type ReplyFn = dyn Fn(&[ChatMessage], &str) -> String + Send + Sync;

enum Script {
    Queue(Mutex<VecDeque<String>>),
    Func(Box<ReplyFn>),
}

/// A request seen by a [`ScriptedProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

pub struct ScriptedProvider {
    name: String,
    script: Script,
    calls: Mutex<Vec<RecordedCall>>,
}

impl std::fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("name", &self.name)
            .field("calls", &self.call_count())
            .finish()
    }
}

impl ScriptedProvider {
    /// Replay `replies` in order; calls beyond the end fail
    pub fn new<I, S>(name: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            script: Script::Queue(Mutex::new(replies.into_iter().map(Into::into).collect())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Compute each reply from the conversation and system prompt
    pub fn from_fn<F>(name: impl Into<String>, reply: F) -> Self
    where
        F: Fn(&[ChatMessage], &str) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            script: Script::Func(Box::new(reply)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn next_reply(&self, messages: &[ChatMessage], system: &str) -> Option<String> {
        match &self.script {
            Script::Queue(queue) => queue.lock().ok()?.pop_front(),
            Script::Func(f) => Some(f(messages, system)),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.name
    }

    async fn chat(&self, messages: &[ChatMessage], system: &str) -> Result<ChatResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                system: system.to_string(),
                messages: messages.to_vec(),
            });
        }

        let text = self
            .next_reply(messages, system)
            .ok_or_else(|| ProviderError::Exhausted(self.name.clone()))?;

        let input_tokens = messages.iter().map(|m| word_count(&m.content)).sum::<u32>()
            + word_count(system);
        let output_tokens = word_count(&text);

        Ok(ChatResponse {
            text,
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage {
                input_tokens,
                output_tokens,
            },
        })
    }
}

/// Rough stand-in for a tokenizer
fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_replays_in_order_then_fails() {
        let provider = ScriptedProvider::new("student", ["first", "second"]);
        assert_eq!(provider.chat(&[], "sys").await.unwrap().text, "first");
        assert_eq!(provider.chat(&[], "sys").await.unwrap().text, "second");
        assert!(provider.chat(&[], "sys").await.is_err());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_from_fn_sees_request() {
        let provider = ScriptedProvider::from_fn("echo", |messages, system| {
            format!("{}:{}", system, messages.len())
        });
        let reply = provider
            .chat(&[ChatMessage::user("a"), ChatMessage::assistant("b")], "sys")
            .await
            .unwrap();
        assert_eq!(reply.text, "sys:2");
    }

    #[tokio::test]
    async fn test_records_calls_and_usage() {
        let provider = ScriptedProvider::new("m", ["two words"]);
        let reply = provider
            .chat(&[ChatMessage::user("what is RLHF")], "be brief")
            .await
            .unwrap();
        assert_eq!(reply.usage.input_tokens, 5);
        assert_eq!(reply.usage.output_tokens, 2);

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, "be brief");
        assert_eq!(calls[0].messages, vec![ChatMessage::user("what is RLHF")]);
    }

    #[tokio::test]
    async fn test_default_stream_emits_whole_reply() {
        let provider = ScriptedProvider::new("m", ["hello there"]);
        let mut seen = Vec::new();
        let mut sink = |t: &str| seen.push(t.to_string());
        provider.chat_stream(&[], "", &mut sink).await.unwrap();
        assert_eq!(seen, vec!["hello there"]);
    }
}
