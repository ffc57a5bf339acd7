//! Shared types for colloquy-core

use serde::{Deserialize, Serialize};

/// Marker an LLM emits to end its own task
pub const DONE: &str = "DONE";

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Llm,
    Agent,
    User,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Llm => write!(f, "llm"),
            Self::Agent => write!(f, "agent"),
            Self::User => write!(f, "user"),
        }
    }
}

/// A message passed between agents and tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDocument {
    pub content: String,
    pub sender: Entity,
    /// Name of the agent or task that produced the message
    pub sender_name: String,
    /// Addressee parsed from a `TO[<recipient>]:` prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl ChatDocument {
    pub fn new(content: impl Into<String>, sender: Entity, sender_name: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sender,
            sender_name: sender_name.into(),
            recipient: None,
        }
    }

    /// A message typed by a person
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(content, Entity::User, "User")
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Whether this message is addressed to `name` (unaddressed messages are for anyone)
    pub fn is_for(&self, name: &str) -> bool {
        self.recipient.as_deref().is_none_or(|r| r == name)
    }

    pub fn is_done(&self) -> bool {
        is_done(&self.content)
    }
}

/// Split a leading `TO[<recipient>]:` prefix off `text`.
///
/// The prefix is a prompt-level convention, so parsing is lenient: leading
/// whitespace, a lowercase `to`, spaces inside the brackets and a missing
/// colon are all accepted. Anything else yields no recipient and the text
/// unchanged.
pub fn parse_recipient(text: &str) -> (Option<String>, &str) {
    let trimmed = text.trim_start();
    let has_prefix = trimmed
        .get(..3)
        .is_some_and(|p| p.eq_ignore_ascii_case("to["));
    if !has_prefix {
        return (None, text);
    }

    let rest = &trimmed[3..];
    let Some(close) = rest.find(']') else {
        return (None, text);
    };

    let name = rest[..close].trim();
    let after = &rest[close + 1..];
    let body = after.strip_prefix(':').unwrap_or(after).trim_start();

    if name.is_empty() {
        (None, body)
    } else {
        (Some(name.to_string()), body)
    }
}

/// Byte offset of the first standalone `DONE` word
fn find_done(text: &str) -> Option<usize> {
    text.match_indices(DONE).map(|(i, _)| i).find(|&i| {
        let before = text[..i].chars().next_back();
        let after = text[i + DONE.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Whether `text` contains the `DONE` marker as a word
pub fn is_done(text: &str) -> bool {
    find_done(text).is_some()
}

/// Remove the first `DONE` marker and any punctuation glued to it
pub fn strip_done(text: &str) -> String {
    let Some(i) = find_done(text) else {
        return text.trim().to_string();
    };
    let head = text[..i].trim_end();
    let tail = text[i + DONE.len()..]
        .trim_start_matches(|c: char| matches!(c, ':' | ',' | '.' | '!') || c.is_whitespace());

    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.trim_end().to_string(),
        (false, true) => head.to_string(),
        (false, false) => format!("{}\n{}", head, tail.trim_end()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recipient_basic() {
        let (to, body) = parse_recipient("TO[TrainingExpert]: What is pretraining?");
        assert_eq!(to.as_deref(), Some("TrainingExpert"));
        assert_eq!(body, "What is pretraining?");
    }

    #[test]
    fn test_parse_recipient_lenient_forms() {
        let (to, body) = parse_recipient("  to[ EvaluationExpert ] How is perplexity used?");
        assert_eq!(to.as_deref(), Some("EvaluationExpert"));
        assert_eq!(body, "How is perplexity used?");
    }

    #[test]
    fn test_parse_recipient_absent() {
        let text = "What is fine-tuning?";
        assert_eq!(parse_recipient(text), (None, text));
    }

    #[test]
    fn test_parse_recipient_unclosed_bracket() {
        let text = "TO[TrainingExpert what is RLHF?";
        assert_eq!(parse_recipient(text), (None, text));
    }

    #[test]
    fn test_parse_recipient_not_at_start() {
        let text = "Question TO[TrainingExpert]: hi";
        assert_eq!(parse_recipient(text).0, None);
    }

    #[test]
    fn test_parse_recipient_empty_brackets() {
        let (to, body) = parse_recipient("TO[]: hello");
        assert_eq!(to, None);
        assert_eq!(body, "hello");
    }

    #[test]
    fn test_is_done_requires_word() {
        assert!(is_done("DONE"));
        assert!(is_done("I am DONE. Here are the points"));
        assert!(is_done("DONE:\n- a\n- b"));
        assert!(!is_done("ABANDONED"));
        assert!(!is_done("DONEness"));
        assert!(!is_done("done"));
    }

    #[test]
    fn test_strip_done() {
        assert_eq!(strip_done("DONE\n- one\n- two"), "- one\n- two");
        assert_eq!(strip_done("DONE: - one"), "- one");
        assert_eq!(strip_done("Thanks! DONE"), "Thanks!");
        assert_eq!(strip_done("Here:\nDONE\n- one"), "Here:\n- one");
        assert_eq!(strip_done("  no marker  "), "no marker");
    }

    #[test]
    fn test_is_for() {
        let open = ChatDocument::user("hi");
        assert!(open.is_for("Anyone"));

        let addressed = ChatDocument::user("hi").with_recipient("TrainingExpert");
        assert!(addressed.is_for("TrainingExpert"));
        assert!(!addressed.is_for("EvaluationExpert"));
    }

    #[test]
    fn test_entity_display() {
        assert_eq!(Entity::Llm.to_string(), "llm");
        assert_eq!(Entity::Agent.to_string(), "agent");
        assert_eq!(Entity::User.to_string(), "user");
    }
}
