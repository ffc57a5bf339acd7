//! Agents: the conversational entities a [`Task`](crate::task::Task) drives
//!
//! An agent offers up to two responders: a deterministic handler
//! ([`Agent::agent_response`]) and an LLM ([`Agent::llm_response`]). Either may
//! decline by returning `None`, letting the task try the next responder.

pub mod chat;
pub mod validator;

use anyhow::Result;
use async_trait::async_trait;

use crate::providers::ChatUsage;
use crate::types::ChatDocument;

pub use chat::{ChatAgent, ChatAgentConfig, LlmConfig};
pub use validator::{RecipientValidator, RecipientValidatorConfig};

#[async_trait]
pub trait Agent: Send {
    fn name(&self) -> &str;

    /// Replace the agent's standing instructions
    fn set_system_message(&mut self, _system: &str) {}

    /// Respond to `msg` without consulting an LLM
    async fn agent_response(&mut self, _msg: &ChatDocument) -> Result<Option<ChatDocument>> {
        Ok(None)
    }

    /// Respond to `msg` with the agent's LLM; `None` asks the LLM to open the conversation
    async fn llm_response(&mut self, _msg: Option<&ChatDocument>) -> Result<Option<ChatDocument>> {
        Ok(None)
    }

    fn has_llm(&self) -> bool {
        false
    }

    /// Whether this agent inspects messages addressed to someone else
    fn accepts_any_recipient(&self) -> bool {
        false
    }

    /// Tokens spent so far
    fn usage(&self) -> ChatUsage {
        ChatUsage::default()
    }
}

/// Receives conversation output as it happens
pub trait OutputSink: Send + Sync {
    /// A streamed fragment of an LLM reply from `sender`
    fn on_delta(&self, sender: &str, text: &str);

    /// A complete, accepted response
    fn on_message(&self, msg: &ChatDocument);
}

/// Discards all output
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn on_delta(&self, _sender: &str, _text: &str) {}
    fn on_message(&self, _msg: &ChatDocument) {}
}
