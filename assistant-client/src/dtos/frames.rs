//! JSON frames exchanged over the realtime channel.

use crate::models::{RealtimeMessage, RetrievalContext, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundFrame {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl OutboundFrame {
    pub fn user(content: impl Into<String>, model: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            model,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InboundFrame {
    pub role: Role,
    pub content: String,
    #[serde(rename = "ragContext", default)]
    pub rag_context: Vec<RagContextItem>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RagContextItem {
    pub text: String,
    #[serde(default)]
    pub metadata: RagMetadata,
    #[serde(default)]
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RagMetadata {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub page: Option<serde_json::Value>,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl InboundFrame {
    /// Parse a text frame. Only assistant frames are accepted.
    pub fn parse(text: &str) -> Result<Self, String> {
        let frame: InboundFrame =
            serde_json::from_str(text).map_err(|e| format!("malformed frame: {}", e))?;

        if frame.role != Role::Assistant {
            return Err(format!("unexpected role {:?} in inbound frame", frame.role));
        }

        Ok(frame)
    }
}

impl From<InboundFrame> for RealtimeMessage {
    fn from(frame: InboundFrame) -> Self {
        let context = frame
            .rag_context
            .into_iter()
            .map(|item| RetrievalContext {
                text: item.text,
                source: item.metadata.source,
                relevance_score: item.relevance_score,
            })
            .collect();

        RealtimeMessage::assistant(frame.content)
            .with_retrieval_context(context)
            .with_model(frame.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_omits_missing_model() {
        let json = serde_json::to_string(&OutboundFrame::user("hello", None)).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);

        let json =
            serde_json::to_string(&OutboundFrame::user("hello", Some("qwen2".to_string())))
                .unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello","model":"qwen2"}"#);
    }

    #[test]
    fn test_parse_assistant_frame_with_context() {
        let text = r#"{
            "role": "assistant",
            "content": "Revenue grew 12%.",
            "ragContext": [{
                "text": "Q3 revenue increased by 12 percent",
                "metadata": {"source": "q3.pdf", "page": 2, "file_id": "f-1", "tags": ["finance"]},
                "relevance_score": 0.82
            }],
            "model": "qwen2"
        }"#;

        let message: RealtimeMessage = InboundFrame::parse(text).unwrap().into();
        let context = message.retrieval_context.unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].source.as_deref(), Some("q3.pdf"));
        assert!((context[0].relevance_score - 0.82).abs() < f64::EPSILON);
        assert_eq!(message.model.as_deref(), Some("qwen2"));
    }

    #[test]
    fn test_missing_rag_context_defaults_to_empty() {
        let frame = InboundFrame::parse(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert!(frame.rag_context.is_empty());
    }

    #[test]
    fn test_rejects_malformed_and_user_frames() {
        assert!(InboundFrame::parse("not json").is_err());
        assert!(InboundFrame::parse(r#"{"content":"no role"}"#).is_err());
        assert!(InboundFrame::parse(r#"{"role":"user","content":"echo"}"#).is_err());
    }
}
