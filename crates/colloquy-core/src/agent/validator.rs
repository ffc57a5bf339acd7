//! Recipient validator. Checks that LLM messages name a known addressee
//!
//! Addressing is a soft convention carried in prompt text (`TO[<recipient>]:`),
//! so nothing guarantees the LLM follows it. The validator sits first among
//! the sub-tasks and bounces any message that names nobody, or somebody
//! unknown, back to the LLM with a reminder.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Agent;
use crate::types::{ChatDocument, Entity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientValidatorConfig {
    pub recipients: Vec<String>,
}

impl RecipientValidatorConfig {
    pub fn new<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recipients: recipients.into_iter().map(Into::into).collect(),
        }
    }
}

pub struct RecipientValidator {
    name: String,
    recipients: Vec<String>,
    /// Body of the last message bounced for lacking a valid recipient
    stashed: Option<String>,
}

impl RecipientValidator {
    pub fn new(config: RecipientValidatorConfig) -> Self {
        Self {
            name: "RecipientValidator".to_string(),
            recipients: config.recipients,
            stashed: None,
        }
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    fn is_valid(&self, name: &str) -> bool {
        self.recipients.iter().any(|r| r == name)
    }

    fn clarification(&self) -> String {
        format!(
            "Who is this message for? Start your message with \"TO[<recipient>]:\", \
             where <recipient> is one of: {}. If you only need to say who your \
             previous message was for, reply with just that name.",
            self.recipients.join(", ")
        )
    }

    /// The name in a reply that only names a recipient, e.g. `TrainingExpert`
    /// or `TO[TrainingExpert]:`. The name is not checked against the known ones.
    fn bare_name(msg: &ChatDocument) -> Option<&str> {
        let content = msg.content.trim();
        match &msg.recipient {
            Some(r) => content.is_empty().then_some(r.as_str()),
            None => {
                let word = content.trim_matches(|c: char| !c.is_alphanumeric());
                (!word.is_empty() && !word.contains(char::is_whitespace)).then_some(word)
            }
        }
    }
}

#[async_trait]
impl Agent for RecipientValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn agent_response(&mut self, msg: &ChatDocument) -> Result<Option<ChatDocument>> {
        if msg.sender != Entity::Llm || msg.is_done() {
            return Ok(None);
        }

        match (Self::bare_name(msg), self.stashed.take()) {
            (Some(name), Some(stashed)) if self.is_valid(name) => {
                info!("Re-addressing previous message to {}", name);
                let doc = ChatDocument::new(stashed, Entity::Agent, self.name.clone())
                    .with_recipient(name);
                return Ok(Some(doc));
            }
            (Some(name), Some(stashed)) => {
                info!("{} is not a known recipient; asking again", name);
                self.stashed = Some(stashed);
                return Ok(Some(ChatDocument::new(
                    self.clarification(),
                    Entity::Agent,
                    self.name.clone(),
                )));
            }
            // anything else is a new message and replaces the stash
            _ => {}
        }

        match msg.recipient.as_deref() {
            Some(r) if self.is_valid(r) => {
                debug!("Recipient {} is valid", r);
                Ok(None)
            }
            other => {
                info!(
                    "Message from {} has {} recipient {:?}; asking for clarification",
                    msg.sender_name,
                    if other.is_some() { "unknown" } else { "no" },
                    other
                );
                self.stashed = Some(msg.content.clone());
                Ok(Some(ChatDocument::new(
                    self.clarification(),
                    Entity::Agent,
                    self.name.clone(),
                )))
            }
        }
    }

    fn accepts_any_recipient(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> RecipientValidator {
        RecipientValidator::new(RecipientValidatorConfig::new([
            "TrainingExpert",
            "EvaluationExpert",
        ]))
    }

    fn from_llm(content: &str, recipient: Option<&str>) -> ChatDocument {
        let mut doc = ChatDocument::new(content, Entity::Llm, "Student");
        doc.recipient = recipient.map(str::to_string);
        doc
    }

    #[tokio::test]
    async fn test_valid_recipient_passes() {
        let mut v = validator();
        let msg = from_llm("What is pretraining?", Some("TrainingExpert"));
        assert!(v.agent_response(&msg).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_recipient_asks() {
        let mut v = validator();
        let msg = from_llm("What is pretraining?", None);
        let reply = v.agent_response(&msg).await.unwrap().unwrap();
        assert_eq!(reply.sender, Entity::Agent);
        assert!(reply.content.contains("TO[<recipient>]:"));
        assert!(reply.content.contains("TrainingExpert, EvaluationExpert"));
        assert!(reply.recipient.is_none());
    }

    #[tokio::test]
    async fn test_unknown_recipient_asks() {
        let mut v = validator();
        let msg = from_llm("hi", Some("Professor"));
        assert!(v.agent_response(&msg).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bare_name_readdresses_stashed_message() {
        let mut v = validator();
        v.agent_response(&from_llm("How is BLEU computed?", None))
            .await
            .unwrap();

        let reply = v
            .agent_response(&from_llm("EvaluationExpert.", None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "How is BLEU computed?");
        assert_eq!(reply.recipient.as_deref(), Some("EvaluationExpert"));

        // stash is consumed
        let again = v.agent_response(&from_llm("EvaluationExpert", None)).await.unwrap();
        assert!(again.unwrap().content.starts_with("Who is this message for?"));
    }

    #[tokio::test]
    async fn test_unknown_bare_name_keeps_stashed_message() {
        let mut v = validator();
        v.agent_response(&from_llm("What is dropout?", None)).await.unwrap();

        let retry = v
            .agent_response(&from_llm("Professor", None))
            .await
            .unwrap()
            .unwrap();
        assert!(retry.content.starts_with("Who is this message for?"));

        let reply = v
            .agent_response(&from_llm("TrainingExpert", None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "What is dropout?");
        assert_eq!(reply.recipient.as_deref(), Some("TrainingExpert"));
    }

    #[tokio::test]
    async fn test_unknown_prefix_only_keeps_stashed_message() {
        let mut v = validator();
        v.agent_response(&from_llm("What is BLEU?", None)).await.unwrap();
        v.agent_response(&from_llm("", Some("Professor"))).await.unwrap();

        let reply = v
            .agent_response(&from_llm("EvaluationExpert", None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "What is BLEU?");
    }

    #[tokio::test]
    async fn test_new_question_replaces_stash() {
        let mut v = validator();
        v.agent_response(&from_llm("What is dropout?", None)).await.unwrap();
        v.agent_response(&from_llm("What is weight decay?", None)).await.unwrap();

        let reply = v
            .agent_response(&from_llm("TrainingExpert", None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "What is weight decay?");
    }

    #[tokio::test]
    async fn test_prefix_only_readdresses_stashed_message() {
        let mut v = validator();
        v.agent_response(&from_llm("What is dropout?", None)).await.unwrap();
        let reply = v
            .agent_response(&from_llm("", Some("TrainingExpert")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "What is dropout?");
        assert_eq!(reply.recipient.as_deref(), Some("TrainingExpert"));
    }

    #[tokio::test]
    async fn test_full_readdressed_question_passes_after_clarification() {
        let mut v = validator();
        v.agent_response(&from_llm("What is dropout?", None)).await.unwrap();
        let msg = from_llm("What is dropout?", Some("TrainingExpert"));
        assert!(v.agent_response(&msg).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ignores_non_llm_and_done() {
        let mut v = validator();
        let expert = ChatDocument::new("Pretraining is...", Entity::Agent, "TrainingExpert");
        assert!(v.agent_response(&expert).await.unwrap().is_none());

        let done = from_llm("DONE\n- a\n- b", None);
        assert!(v.agent_response(&done).await.unwrap().is_none());
    }

    #[test]
    fn test_config_and_flags() {
        let v = validator();
        assert_eq!(v.recipients(), ["TrainingExpert", "EvaluationExpert"]);
        assert!(v.accepts_any_recipient());
        assert!(!v.has_llm());
        assert_eq!(v.name(), "RecipientValidator");
    }
}
