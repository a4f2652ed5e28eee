//! Conversation message types.
//!
//! A `Message` is a tagged union over `role`; assistant messages may carry zero or more
//! `ToolCall`s, tool messages carry exactly one `tool_call_id`. Every tool-use id has a
//! tool-result peer except during the brief window recovered by orphan pruning.

use serde::{Deserialize, Serialize};

/// Participant role of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One part of a multi-part message content list (text or attachment).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Attachment { mime_type: String, data: String },
}

/// Message content: either plain text or a list of parts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Flattens content to a single string for token estimation, logging, and transcripts.
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    ContentPart::Attachment { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn len_chars(&self) -> usize {
        self.as_text().len()
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

/// A single tool invocation requested by an assistant message. Ids are unique per
/// conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Token usage reported on an assistant message (providers report cumulatively; §4.3).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
}

/// A single message in the conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,
}

impl Message {
    pub fn system(content: impl Into<Content>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    fn new(role: Role, content: impl Into<Content>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: None,
            usage: None,
            thinking: None,
            citations: vec![],
        }
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Tool-call ids on this message that have no corresponding `tool_result` peer in `rest`.
    /// `rest` is conventionally the remainder of the conversation after this message.
    pub fn orphaned_tool_call_ids(&self, rest: &[Message]) -> Vec<String> {
        if self.role != Role::Assistant || self.tool_calls.is_empty() {
            return vec![];
        }
        self.tool_calls
            .iter()
            .filter(|tc| {
                !rest.iter().any(|m| {
                    m.role == Role::Tool && m.tool_call_id.as_deref() == Some(tc.id.as_str())
                })
            })
            .map(|tc| tc.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_produce_correct_role() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        let t = Message::tool_result("tc1", "r");
        assert_eq!(t.role, Role::Tool);
        assert_eq!(t.tool_call_id.as_deref(), Some("tc1"));
    }

    #[test]
    fn content_as_text_flattens_parts() {
        let c = Content::Parts(vec![
            ContentPart::Text { text: "a".into() },
            ContentPart::Attachment {
                mime_type: "image/png".into(),
                data: "base64".into(),
            },
            ContentPart::Text { text: "b".into() },
        ]);
        assert_eq!(c.as_text(), "ab");
    }

    #[test]
    fn orphaned_tool_call_ids_finds_unmatched() {
        let assistant = Message::assistant("").with_tool_calls(vec![
            ToolCall {
                id: "tc1".into(),
                name: "Read".into(),
                arguments: serde_json::json!({}),
            },
            ToolCall {
                id: "tc2".into(),
                name: "Write".into(),
                arguments: serde_json::json!({}),
            },
        ]);
        let rest = vec![Message::tool_result("tc1", "ok")];
        assert_eq!(assistant.orphaned_tool_call_ids(&rest), vec!["tc2".to_string()]);
    }

    #[test]
    fn message_serialize_roundtrip() {
        let m = Message::user("hi");
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::User);
        assert_eq!(back.content.as_text(), "hi");
    }
}
