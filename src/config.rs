//! Configuration types.

use serde::{Deserialize, Serialize};

/// Who the assistant works for and how their email should be handled.
///
/// The triage fields are guidance text interpolated into the triage
/// prompt; they describe, in the user's own words, which emails to drop,
/// which to surface, and which to answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantProfile {
    /// Short name used inside prompts ("Sam").
    pub name: String,
    /// Full name used for drafted signatures ("Sam Rivera").
    pub full_name: String,
    /// One-paragraph description of who the user is.
    pub background: String,
    /// IANA timezone for scheduling language.
    pub timezone: String,
    /// Emails not worth responding to or surfacing.
    pub triage_no: String,
    /// Emails the user should see but that need no reply.
    pub triage_notify: String,
    /// Emails that deserve a drafted response.
    pub triage_email: String,
}

impl Default for AssistantProfile {
    fn default() -> Self {
        Self {
            name: "the user".to_string(),
            full_name: "the user".to_string(),
            background: "A busy professional who receives more email than they can read."
                .to_string(),
            timezone: "America/New_York".to_string(),
            triage_no: "Cold outreach from vendors, automated notifications that require no \
                        action, newsletters, and spam."
                .to_string(),
            triage_notify: "Document shares, FYI threads the user is cc'd on, and \
                            time-sensitive notices the user should see but not answer."
                .to_string(),
            triage_email: "Direct questions from real people, meeting requests, and threads \
                           where the user is expected to reply."
                .to_string(),
        }
    }
}
