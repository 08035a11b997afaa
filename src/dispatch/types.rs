//! Shared types for the triage/draft/act pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::llm::ToolDefinition;

// ── Inbound email ───────────────────────────────────────────────────

/// An inbound email event entering the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailEvent {
    /// Provider-native message id.
    pub id: String,
    /// Provider-native thread id.
    pub thread_id: String,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    /// Full thread body, latest email first.
    pub body: String,
    pub send_time: DateTime<Utc>,
}

impl EmailEvent {
    /// Markdown rendering shown to the user when asking for guidance.
    pub fn to_markdown(&self) -> String {
        format!(
            "# {}\n\n**To**: {}\n**From**: {}\n\n{}",
            self.subject, self.to_email, self.from_email, self.body
        )
    }

    /// One-line notification text.
    pub fn notification_line(&self) -> String {
        format!("You got a message from {}: {}", self.from_email, self.subject)
    }
}

// ── Triage ──────────────────────────────────────────────────────────

/// Triage classification for an inbound email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageDecision {
    /// Not worth responding to or surfacing.
    No,
    /// Worth telling the user about; no reply needed.
    Notify,
    /// Deserves a drafted response.
    Email,
}

impl TriageDecision {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Notify => "notify",
            Self::Email => "email",
        }
    }
}

// ── Actions ─────────────────────────────────────────────────────────

/// Names of the closed drafting tool set.
pub mod tool_names {
    pub const WRITE_EMAIL_RESPONSE: &str = "write_email_response";
    pub const START_NEW_EMAIL_THREAD: &str = "start_new_email_thread";
    pub const SEND_CALENDAR_INVITE: &str = "send_calendar_invite";
    pub const MARK_EMAIL_AS_READ: &str = "mark_email_as_read";
    pub const MESSAGE_USER: &str = "message_user";
    pub const REWRITE_EMAIL: &str = "rewrite_email";
}

/// What the dispatcher does with a drafted tool call.
///
/// The mapping from tool name to action is total over the closed tool set;
/// anything else is a configuration error, not a model judgment call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Send a reply on the current thread.
    Send,
    /// Start a new email thread.
    StartThread,
    /// Send a calendar invite.
    Schedule,
    /// Mark the inbound email as read.
    MarkRead,
    /// Suspend and ask the user for guidance.
    AskUser,
    /// Redraft the pending response in the user's tone, then act again.
    Rewrite,
}

impl Action {
    pub fn from_tool_name(name: &str) -> Result<Self, DispatchError> {
        match name {
            tool_names::WRITE_EMAIL_RESPONSE => Ok(Self::Send),
            tool_names::START_NEW_EMAIL_THREAD => Ok(Self::StartThread),
            tool_names::SEND_CALENDAR_INVITE => Ok(Self::Schedule),
            tool_names::MARK_EMAIL_AS_READ => Ok(Self::MarkRead),
            tool_names::MESSAGE_USER => Ok(Self::AskUser),
            tool_names::REWRITE_EMAIL => Ok(Self::Rewrite),
            other => Err(DispatchError::UnknownTool {
                name: other.to_string(),
            }),
        }
    }

    /// Whether a call with this action carries a draft that can be
    /// rewritten for tone.
    pub fn is_rewritable(&self) -> bool {
        matches!(self, Self::Send | Self::StartThread)
    }
}

/// The tool surface offered to the drafting model call.
pub fn drafting_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            tool_names::MESSAGE_USER,
            "Get feedback from the user on what to do with the email",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string"}
                },
                "required": ["question"]
            }),
        ),
        ToolDefinition::new(
            tool_names::WRITE_EMAIL_RESPONSE,
            "Write an email response to the current thread",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "new_recipients": {
                        "type": "array",
                        "items": {"type": "string"}
                    }
                },
                "required": ["content"]
            }),
        ),
        ToolDefinition::new(
            tool_names::START_NEW_EMAIL_THREAD,
            "Start a new email thread",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "subject": {"type": "string"},
                    "recipients": {
                        "type": "array",
                        "items": {"type": "string"}
                    }
                },
                "required": ["content", "subject", "recipients"]
            }),
        ),
        ToolDefinition::new(
            tool_names::SEND_CALENDAR_INVITE,
            "Create a new calendar event by sending an invite. The start_time and end_time \
             should be in `2024-07-01T14:00:00` format, with an IANA Time Zone Database name",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "emails": {
                        "type": "array",
                        "items": {"type": "string"}
                    },
                    "event_title": {"type": "string"},
                    "start_time": {"type": "string"},
                    "end_time": {"type": "string"},
                    "timezone": {"type": "string"}
                },
                "required": ["emails", "event_title", "start_time", "end_time"]
            }),
        ),
        ToolDefinition::new(
            tool_names::MARK_EMAIL_AS_READ,
            "Mark the email as read",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::new(
            tool_names::REWRITE_EMAIL,
            "Rewrite the pending draft to better match the user's tone before sending",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "tone_feedback": {"type": "string"}
                }
            }),
        ),
    ]
}

// ── Outcome ─────────────────────────────────────────────────────────

/// How a dispatched turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Triage decided the email needs nothing; it was marked read.
    Ignored,
    /// The user was notified and the email marked read.
    Notified,
    /// An action ran (successfully or not) and its result is in the log.
    Acted { action: Action },
    /// The turn is suspended on a `message_user` call awaiting the user.
    AwaitingUser,
    /// The model answered with plain text; nothing was executed.
    Drafted,
}

/// A finished (or suspended) turn: the outcome plus the log to persist.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub outcome: Outcome,
    pub log: crate::thread::MessageLog,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_name_mapping_is_total_over_closed_set() {
        for def in drafting_tools() {
            assert!(Action::from_tool_name(&def.name).is_ok(), "{}", def.name);
        }
    }

    #[test]
    fn test_unknown_tool_is_fatal() {
        let err = Action::from_tool_name("delete_mailbox").unwrap_err();
        match err {
            DispatchError::UnknownTool { name } => assert_eq!(name, "delete_mailbox"),
            other => panic!("Expected UnknownTool, got {other:?}"),
        }
    }

    #[test]
    fn test_rewritable_actions() {
        assert!(Action::Send.is_rewritable());
        assert!(Action::StartThread.is_rewritable());
        assert!(!Action::Schedule.is_rewritable());
        assert!(!Action::AskUser.is_rewritable());
        assert!(!Action::Rewrite.is_rewritable());
    }

    #[test]
    fn test_email_markdown_includes_headers() {
        let email = sample_email();
        let md = email.to_markdown();
        assert!(md.starts_with("# Quick question"));
        assert!(md.contains("**From**: alice@example.com"));
        assert!(md.contains("Can we meet Tuesday?"));
    }

    #[test]
    fn test_notification_line() {
        let email = sample_email();
        assert_eq!(
            email.notification_line(),
            "You got a message from alice@example.com: Quick question"
        );
    }

    fn sample_email() -> EmailEvent {
        EmailEvent {
            id: "m-1".into(),
            thread_id: "t-1".into(),
            from_email: "alice@example.com".into(),
            to_email: "user@example.com".into(),
            subject: "Quick question".into(),
            body: "Can we meet Tuesday?".into(),
            send_time: Utc::now(),
        }
    }
}
