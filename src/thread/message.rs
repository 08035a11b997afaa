//! Message and message-log types.
//!
//! Messages are created once and never mutated in place. Corrections go
//! through whole-log replacement or `MessageLog::replace`, never through
//! field edits on an existing record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    Human,
    Agent,
    ToolResult,
}

/// A structured tool invocation emitted by an agent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique within the emitting message; assigned by the model provider.
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// A single record in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier, assigned at creation and never reused.
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    /// Only meaningful on `Agent` messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Back-reference to the answered `ToolCall.id`; only on `ToolResult`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn base(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::base(Role::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::base(Role::Human, content)
    }

    pub fn agent(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::base(Role::Agent, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::base(Role::ToolResult, content)
        }
    }

    /// Shape check: tool calls only on agent messages, a call back-reference
    /// only on tool results.
    pub fn is_well_formed(&self) -> bool {
        match self.role {
            Role::Agent => self.tool_call_id.is_none(),
            Role::ToolResult => self.tool_calls.is_empty() && self.tool_call_id.is_some(),
            Role::System | Role::Human => {
                self.tool_calls.is_empty() && self.tool_call_id.is_none()
            }
        }
    }
}

/// The ordered conversation log. Append-only in normal operation; only the
/// repair engine rewrites it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLog(Vec<Message>);

impl MessageLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self(messages)
    }

    pub fn push(&mut self, message: Message) {
        self.0.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }

    /// Replace the message with the given id by a new record.
    ///
    /// Returns false when no message has that id. This is the splice used
    /// for draft rewrites; the replacement carries the same id so tool-call
    /// linkage survives.
    pub fn replace(&mut self, id: Uuid, message: Message) -> bool {
        match self.0.iter().position(|m| m.id == id) {
            Some(idx) => {
                self.0[idx] = message;
                true
            }
            None => false,
        }
    }

    /// Tool calls that have no answering tool result anywhere in the log.
    pub fn unanswered_calls(&self) -> Vec<&ToolCall> {
        let answered: Vec<&str> = self
            .0
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        self.0
            .iter()
            .filter(|m| m.role == Role::Agent)
            .flat_map(|m| m.tool_calls.iter())
            .filter(|c| !answered.contains(&c.id.as_str()))
            .collect()
    }

    /// Whether every agent tool call is immediately followed, in call order,
    /// by its answering tool results.
    pub fn is_paired(&self) -> bool {
        let msgs = &self.0;
        let mut i = 0;
        while i < msgs.len() {
            let m = &msgs[i];
            if m.role == Role::Agent && !m.tool_calls.is_empty() {
                for (offset, call) in m.tool_calls.iter().enumerate() {
                    let Some(next) = msgs.get(i + 1 + offset) else {
                        return false;
                    };
                    if next.role != Role::ToolResult
                        || next.tool_call_id.as_deref() != Some(call.id.as_str())
                    {
                        return false;
                    }
                }
                i += 1 + m.tool_calls.len();
            } else {
                i += 1;
            }
        }
        true
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors_are_well_formed() {
        assert!(Message::system("s").is_well_formed());
        assert!(Message::human("h").is_well_formed());
        assert!(Message::agent("", vec![]).is_well_formed());
        assert!(
            Message::agent(
                "",
                vec![ToolCall::new("c1", "send", serde_json::json!({}))]
            )
            .is_well_formed()
        );
        assert!(Message::tool_result("c1", "ok").is_well_formed());
    }

    #[test]
    fn test_malformed_shapes_detected() {
        let mut m = Message::human("hi");
        m.tool_call_id = Some("c1".into());
        assert!(!m.is_well_formed());

        let mut m = Message::tool_result("c1", "ok");
        m.tool_calls
            .push(ToolCall::new("c2", "send", serde_json::json!({})));
        assert!(!m.is_well_formed());
    }

    #[test]
    fn test_unanswered_calls() {
        let mut log = MessageLog::new();
        log.push(Message::agent(
            "",
            vec![
                ToolCall::new("c1", "send", serde_json::json!({})),
                ToolCall::new("c2", "schedule", serde_json::json!({})),
            ],
        ));
        log.push(Message::tool_result("c1", "ok"));

        let pending = log.unanswered_calls();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "c2");
    }

    #[test]
    fn test_is_paired() {
        let mut log = MessageLog::new();
        log.push(Message::system("s"));
        log.push(Message::human("h"));
        assert!(log.is_paired());

        log.push(Message::agent(
            "",
            vec![ToolCall::new("c1", "send", serde_json::json!({}))],
        ));
        assert!(!log.is_paired());

        log.push(Message::tool_result("c1", "ok"));
        assert!(log.is_paired());
    }

    #[test]
    fn test_is_paired_rejects_separated_result() {
        let mut log = MessageLog::new();
        log.push(Message::agent(
            "",
            vec![ToolCall::new("c1", "send", serde_json::json!({}))],
        ));
        log.push(Message::human("interjection"));
        log.push(Message::tool_result("c1", "ok"));
        assert!(!log.is_paired());
    }

    #[test]
    fn test_replace_preserves_position() {
        let first = Message::human("one");
        let second = Message::human("two");
        let id = second.id;
        let mut log = MessageLog::from_messages(vec![first, second.clone()]);

        let mut updated = second;
        updated.content = "rewritten".into();
        assert!(log.replace(id, updated));
        assert_eq!(log.messages()[1].content, "rewritten");
        assert!(!log.replace(Uuid::new_v4(), Message::human("x")));
    }

    #[test]
    fn test_serde_round_trip_skips_empty_fields() {
        let m = Message::human("hello");
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
