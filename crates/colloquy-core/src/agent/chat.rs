//! LLM-backed chat agent

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{Agent, NullSink, OutputSink};
use crate::cache::ResponseCache;
use crate::providers::{ChatMessage, ChatResponse, ChatUsage, LlmProvider};
use crate::settings::{self, Settings};
use crate::types::{ChatDocument, Entity, parse_recipient};

/// Which model an agent talks to, and where identical requests are cached
#[derive(Clone)]
pub struct LlmConfig {
    pub provider: Arc<dyn LlmProvider>,
    pub cache: Option<Arc<ResponseCache>>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl LlmConfig {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChatAgentConfig {
    pub name: String,
    pub llm: LlmConfig,
    pub system_message: String,
}

impl ChatAgentConfig {
    pub fn new(llm: LlmConfig) -> Self {
        Self {
            name: "ChatAgent".to_string(),
            llm,
            system_message: "You are a helpful assistant.".to_string(),
        }
    }
}

/// An agent whose replies come from an LLM.
///
/// The agent keeps its own history, which survives across task runs: an
/// expert re-invoked for a second question still remembers the first.
pub struct ChatAgent {
    name: String,
    llm: LlmConfig,
    system: String,
    history: Vec<ChatMessage>,
    settings: Settings,
    sink: Arc<dyn OutputSink>,
    usage: ChatUsage,
}

impl ChatAgent {
    /// Create an agent using the current global settings
    pub fn new(config: ChatAgentConfig) -> Self {
        Self {
            name: config.name,
            llm: config.llm,
            system: config.system_message,
            history: Vec::new(),
            settings: settings::global(),
            sink: Arc::new(NullSink),
            usage: ChatUsage::default(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn system_message(&self) -> &str {
        &self.system
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Ask the provider for a reply to the current history. The flag is true
    /// when the reply was replayed from the cache.
    async fn complete(&self) -> Result<(ChatResponse, bool)> {
        let provider = &self.llm.provider;
        let cache = self.llm.cache.as_ref().filter(|_| self.settings.cache);
        let key = cache.map(|_| ResponseCache::key(provider.model(), &self.system, &self.history));

        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            if let Some(hit) = cache.get(key) {
                debug!("{}: replaying cached response", self.name);
                if self.settings.stream {
                    self.sink.on_delta(&self.name, &hit.text);
                }
                return Ok((hit, true));
            }
        }

        let result = if self.settings.stream {
            let sink = &self.sink;
            let name = self.name.as_str();
            let mut forward = |text: &str| sink.on_delta(name, text);
            provider
                .chat_stream(&self.history, &self.system, &mut forward)
                .await
        } else {
            provider.chat(&self.history, &self.system).await
        };
        let response =
            result.with_context(|| format!("{} failed to get an LLM response", self.name))?;

        if let (Some(cache), Some(key)) = (cache, key) {
            cache.put(key, response.clone());
        }
        Ok((response, false))
    }
}

#[async_trait]
impl Agent for ChatAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_system_message(&mut self, system: &str) {
        self.system = system.to_string();
    }

    async fn llm_response(&mut self, msg: Option<&ChatDocument>) -> Result<Option<ChatDocument>> {
        if let Some(msg) = msg {
            self.history.push(ChatMessage::user(msg.content.clone()));
        }

        if self.settings.debug {
            debug!(
                "{} prompting {} with {} messages:\n{:#?}",
                self.name,
                self.llm.provider.model(),
                self.history.len(),
                self.history
            );
        }

        let (response, cached) = match self.complete().await {
            Ok(reply) => reply,
            Err(e) => {
                // keep history alternating so a retry by the caller is well-formed
                if msg.is_some() {
                    self.history.pop();
                }
                return Err(e);
            }
        };
        // a replayed reply cost nothing this time
        if !cached {
            self.usage += response.usage;
        }

        let text = response.text.trim();
        if text.is_empty() {
            info!("{}: LLM returned an empty reply", self.name);
            if msg.is_some() {
                self.history.pop();
            }
            return Ok(None);
        }
        self.history.push(ChatMessage::assistant(text));

        let (recipient, body) = parse_recipient(text);
        let mut doc = ChatDocument::new(body, Entity::Llm, self.name.clone());
        doc.recipient = recipient;
        debug!(
            "{} replied ({} tokens) to {:?}",
            self.name,
            response.usage.total(),
            doc.recipient
        );
        Ok(Some(doc))
    }

    fn has_llm(&self) -> bool {
        true
    }

    fn usage(&self) -> ChatUsage {
        self.usage
    }
}
