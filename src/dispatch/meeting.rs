//! Meeting-time survey helper.
//!
//! When an email asks to meet, the caller surveys the calendar for the
//! candidate days and has the model condense the findings into a dense
//! availability statement, which then feeds the drafting turn. Runs inside
//! the caller's prompt scope so the schedule preferences are in effect.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::config::AssistantProfile;
use crate::dispatch::prompts::{build_email_input, build_meeting_time_prompt};
use crate::dispatch::types::EmailEvent;
use crate::error::Error;
use crate::llm::Drafter;
use crate::providers::CalendarProvider;
use crate::thread::{Message, MessageLog};

/// Surveys calendar days and reports availability for a meeting request.
pub struct MeetingTimeFinder {
    drafter: Arc<dyn Drafter>,
    calendar: Arc<dyn CalendarProvider>,
    profile: AssistantProfile,
}

impl MeetingTimeFinder {
    pub fn new(
        drafter: Arc<dyn Drafter>,
        calendar: Arc<dyn CalendarProvider>,
        profile: AssistantProfile,
    ) -> Self {
        Self {
            drafter,
            calendar,
            profile,
        }
    }

    /// Report availability across the candidate days (`dd-mm-yyyy`).
    ///
    /// Calendar lookup failures surface in the survey text rather than
    /// failing the call, matching the Act failure policy.
    pub async fn find(&self, email: &EmailEvent, dates: &[String]) -> Result<String, Error> {
        let mut survey = String::new();
        for date in dates {
            match self.calendar.list_events_for_day(date).await {
                Ok(events) => {
                    survey.push_str(&format!("Events on {date}:\n"));
                    if events.is_empty() {
                        survey.push_str("  (none)\n");
                    }
                    for event in events {
                        survey.push_str(&format!(
                            "  {} - {}: {}\n",
                            event.start_time, event.end_time, event.title
                        ));
                    }
                }
                Err(e) => {
                    survey.push_str(&format!("Error getting events for day: {e}\n"));
                }
            }
        }
        debug!(id = %email.id, days = dates.len(), "Calendar survey complete");

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut conversation = MessageLog::new();
        conversation.push(Message::system(build_meeting_time_prompt(
            &self.profile,
            &today,
        )?));
        conversation.push(Message::human(format!(
            "{}\n\nHere is the calendar for the days in question:\n\n{}",
            build_email_input(email),
            survey
        )));

        let response = self
            .drafter
            .draft(&conversation, &[])
            .await
            .map_err(Error::Llm)?;
        Ok(response.content)
    }
}
