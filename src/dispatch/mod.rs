//! The decision dispatcher: triage → draft → act.

pub mod dispatcher;
pub mod meeting;
pub mod prompts;
pub mod rules;
pub mod types;

pub use dispatcher::{Dispatcher, DispatcherDeps};
pub use meeting::MeetingTimeFinder;
pub use rules::TriageRules;
pub use types::{Action, Dispatched, EmailEvent, Outcome, TriageDecision, drafting_tools};
