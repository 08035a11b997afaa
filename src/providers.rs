//! Provider interfaces the dispatcher acts through.
//!
//! Concrete Gmail/Calendar/Slack clients live outside this crate; the core
//! only needs these trait surfaces. Failures during Act are converted to
//! textual tool results at the action boundary, so implementations should
//! return honest errors and let the dispatcher decide presentation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// An email to send, either as a reply on an existing thread or as the
/// first message of a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Present when replying on an existing thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
}

/// A calendar invite to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarInvite {
    pub title: String,
    /// `2024-07-01T14:00:00` format, interpreted in `timezone`.
    pub start_time: String,
    pub end_time: String,
    pub attendees: Vec<String>,
    /// IANA Time Zone Database name.
    pub timezone: String,
}

/// An existing calendar event, as returned by a day lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub title: String,
    pub start_time: String,
    pub end_time: String,
}

/// Email sending and mailbox state.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), ProviderError>;

    async fn mark_read(&self, message_id: &str) -> Result<(), ProviderError>;
}

/// Calendar lookups and invite creation.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn create_event(&self, invite: CalendarInvite) -> Result<(), ProviderError>;

    /// Events for one day; `date` is in `dd-mm-yyyy` format.
    async fn list_events_for_day(&self, date: &str) -> Result<Vec<CalendarEvent>, ProviderError>;
}

/// Out-of-band user notification (e.g. a chat message).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), ProviderError>;
}
