//! LLM provider layer
//!
//! Providers implement the [`LlmProvider`] trait. [`RetryingProvider`] wraps any
//! of them with backoff, and [`ScriptedProvider`] stands in for a real model in
//! tests.

pub mod error;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod types;

pub use error::ProviderError;
pub use mock::ScriptedProvider;
pub use openai::OpenAiProvider;
pub use retry::RetryingProvider;
pub use types::{ChatMessage, ChatModel, ChatResponse, ChatRole, ChatUsage, LlmProvider, StopReason};
