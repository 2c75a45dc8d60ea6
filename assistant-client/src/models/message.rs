use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A knowledge-base passage the assistant used to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalContext {
    pub text: String,
    pub source: Option<String>,
    pub relevance_score: f64,
}

/// Rewrite actions that can be applied to an existing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageAction {
    Summarize,
    Humanize,
}

impl MessageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageAction::Summarize => "summarize",
            MessageAction::Humanize => "humanize",
        }
    }
}

impl std::str::FromStr for MessageAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summarize" => Ok(MessageAction::Summarize),
            "humanize" => Ok(MessageAction::Humanize),
            _ => Err(format!("Unknown message action: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFrom {
    pub action: MessageAction,
    /// Store sequence number of the message the action was applied to.
    pub source_message: u64,
}

/// One chat message. Immutable once appended to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_context: Option<Vec<RetrievalContext>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<DerivedFrom>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
}

impl RealtimeMessage {
    pub fn user(content: impl Into<String>, model: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            model,
            retrieval_context: None,
            derived_from: None,
            original_content: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            model: None,
            retrieval_context: None,
            derived_from: None,
            original_content: None,
        }
    }

    pub fn with_retrieval_context(mut self, context: Vec<RetrievalContext>) -> Self {
        if !context.is_empty() {
            self.retrieval_context = Some(context);
        }
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Result of applying `action` to the message stored at `source_message`.
    pub fn derived(
        content: impl Into<String>,
        action: MessageAction,
        source_message: u64,
        original_content: impl Into<String>,
    ) -> Self {
        Self {
            derived_from: Some(DerivedFrom {
                action,
                source_message,
            }),
            original_content: Some(original_content.into()),
            ..Self::assistant(content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_retrieval_context_is_omitted() {
        let message = RealtimeMessage::assistant("hi").with_retrieval_context(vec![]);
        assert!(message.retrieval_context.is_none());
    }

    #[test]
    fn test_derived_message_links_source() {
        let message =
            RealtimeMessage::derived("short", MessageAction::Summarize, 4, "a much longer text");

        assert_eq!(message.role, Role::Assistant);
        assert_eq!(
            message.derived_from,
            Some(DerivedFrom {
                action: MessageAction::Summarize,
                source_message: 4
            })
        );
        assert_eq!(message.original_content.as_deref(), Some("a much longer text"));
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("Humanize".parse::<MessageAction>(), Ok(MessageAction::Humanize));
        assert!("translate".parse::<MessageAction>().is_err());
    }
}
