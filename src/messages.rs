//! Intermediate message outputs surfaced while a completion runs
//!
//! Every hop inside a completion (text produced by an agent, a tool being
//! invoked, a tool returning) is reported as a [`MessageOutput`]. Nested
//! agent-to-agent completions feed their outputs into the enclosing stream,
//! so a consumer observes the whole conversation tree in order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of event a [`MessageOutput`] represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    FunctionCall,
    FunctionOutput,
}

impl MessageKind {
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::FunctionCall => "function",
            MessageKind::FunctionOutput => "function output",
        }
    }
}

/// A single intermediate message emitted during a completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageOutput {
    pub id: String,
    pub kind: MessageKind,
    /// Sending agent; `None` means the end user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub recipient: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageOutput {
    fn build(kind: MessageKind, sender: Option<String>, recipient: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            sender,
            recipient,
            content,
            created_at: Utc::now(),
        }
    }

    /// A message from the end user to an agent.
    pub fn user(recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(MessageKind::Text, None, recipient.into(), content.into())
    }

    /// A text message from one agent to another (or back to the user).
    pub fn text(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::build(
            MessageKind::Text,
            Some(sender.into()),
            recipient.into(),
            content.into(),
        )
    }

    /// A tool invocation made by an agent.
    pub fn function_call(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::build(
            MessageKind::FunctionCall,
            Some(sender.into()),
            recipient.into(),
            content.into(),
        )
    }

    /// The output returned by a tool invocation.
    pub fn function_output(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::build(
            MessageKind::FunctionOutput,
            Some(sender.into()),
            recipient.into(),
            content.into(),
        )
    }

    /// The sender name, with the end user rendered as `"user"`.
    pub fn sender_label(&self) -> &str {
        self.sender.as_deref().unwrap_or("user")
    }

    /// One-line rendering used by verbose logging.
    pub fn formatted(&self) -> String {
        format!(
            "[{}] {} -> {}: {}",
            self.kind.label(),
            self.sender_label(),
            self.recipient,
            self.content
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_creation() {
        let msg = MessageOutput::user("CEO", "Hello");
        assert_eq!(msg.kind, MessageKind::Text);
        assert!(msg.sender.is_none());
        assert_eq!(msg.recipient, "CEO");
        assert_eq!(msg.sender_label(), "user");

        let msg = MessageOutput::text("CEO", "Developer", "Please build it");
        assert_eq!(msg.sender, Some("CEO".to_string()));
        assert_eq!(msg.sender_label(), "CEO");
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = MessageOutput::user("CEO", "one");
        let b = MessageOutput::user("CEO", "two");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_formatted() {
        let msg = MessageOutput::function_call("CEO", "Developer", "send_message");
        let line = msg.formatted();
        assert_eq!(line, "[function] CEO -> Developer: send_message");
    }

    #[test]
    fn test_serialization_skips_absent_sender() {
        let msg = MessageOutput::user("CEO", "Hi");
        let serialized = serde_json::to_string(&msg).unwrap();
        assert!(!serialized.contains("\"sender\""));

        let msg = MessageOutput::text("CEO", "Developer", "Hi");
        let serialized = serde_json::to_string(&msg).unwrap();
        assert!(serialized.contains("\"sender\":\"CEO\""));
    }

    #[test]
    fn test_kind_serialization() {
        let kind = MessageKind::FunctionOutput;
        let serialized = serde_json::to_string(&kind).unwrap();
        assert_eq!(serialized, "\"function_output\"");

        let deserialized: MessageKind = serde_json::from_str("\"text\"").unwrap();
        assert_eq!(deserialized, MessageKind::Text);
    }
}
