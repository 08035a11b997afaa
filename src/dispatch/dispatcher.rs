//! The triage → draft → act pipeline.
//!
//! An inbound email is classified (fast rules first, then the model), a
//! response is drafted with registry-backed preferences bound in scope,
//! and the drafted tool call maps onto one named action.
//!
//! Failure policy: provider failures during Act become textual tool
//! results the model can see and react to; they are never raised.
//! Configuration problems (an unregistered prompt key, a tool name outside
//! the closed set) are fatal.
//!
//! The only cycle is `rewrite_email`, which redrafts a pending draft and
//! re-enters the action mapping once. The dispatcher itself does not bound
//! repeated dispatch/rewrite rounds; the surrounding execution engine must
//! impose a hard step ceiling per thread.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AssistantProfile;
use crate::dispatch::prompts::{
    build_draft_system_prompt, build_email_input, build_rewrite_prompt,
    build_triage_system_prompt,
};
use crate::dispatch::rules::TriageRules;
use crate::dispatch::types::{
    Action, Dispatched, EmailEvent, Outcome, TriageDecision, drafting_tools, tool_names,
};
use crate::error::Error;
use crate::llm::{Drafter, ToolDefinition};
use crate::providers::{CalendarInvite, CalendarProvider, EmailProvider, Notifier, OutgoingEmail};
use crate::registry::{Registry, keys};
use crate::store::{Namespace, PromptStore};
use crate::thread::{Message, MessageLog, Role, SUPERSEDED_NOTE, ToolCall, repair};

/// All preference keys a drafting turn binds.
const PREFERENCE_KEYS: [&str; 4] = [
    keys::REWRITE_INSTRUCTIONS,
    keys::BACKGROUND_PREFERENCES,
    keys::RESPONSE_PREFERENCES,
    keys::SCHEDULE_PREFERENCES,
];

const TRIAGE_TOOL: &str = "triage_email";

/// Shared components for the dispatcher.
pub struct DispatcherDeps {
    pub registry: Arc<Registry>,
    pub prompt_store: Arc<dyn PromptStore>,
    pub drafter: Arc<dyn Drafter>,
    pub email: Arc<dyn EmailProvider>,
    pub calendar: Arc<dyn CalendarProvider>,
    pub notifier: Arc<dyn Notifier>,
}

/// The decision dispatcher for one assistant namespace.
pub struct Dispatcher {
    deps: DispatcherDeps,
    rules: TriageRules,
    profile: AssistantProfile,
    namespace: Namespace,
}

impl Dispatcher {
    pub fn new(deps: DispatcherDeps, profile: AssistantProfile, namespace: Namespace) -> Self {
        Self {
            deps,
            rules: TriageRules::default_rules(),
            profile,
            namespace,
        }
    }

    /// Replace the fast-path triage rules.
    pub fn with_rules(mut self, rules: TriageRules) -> Self {
        self.rules = rules;
        self
    }

    // ── Turn entry points ───────────────────────────────────────────

    /// Run one turn for an inbound email.
    ///
    /// The log is normalized first, so a thread abandoned mid-approval can
    /// be dispatched again without any special casing by the caller.
    pub async fn dispatch(&self, email: &EmailEvent, log: MessageLog) -> Result<Dispatched, Error> {
        info!(id = %email.id, from = %email.from_email, "Dispatching inbound email");

        let repaired = repair(&log);
        if repaired.changed {
            debug!(id = %email.id, "Normalized log before dispatch");
        }
        let log = repaired.log;

        let scope = self.deps.registry.with_prompts(&PREFERENCE_KEYS)?;
        scope
            .enter(
                self.deps.prompt_store.as_ref(),
                &self.namespace,
                self.run_turn(email, log),
            )
            .await
            .map_err(Error::Store)?
    }

    /// Resume a turn suspended on a `message_user` call.
    ///
    /// `answer` is the user's reply, or `None` when they never responded.
    /// A missing pending call means the suspension was abandoned; the
    /// answer is then appended as fresh human input and repair handles any
    /// dangling calls.
    pub async fn resume_with_answer(
        &self,
        email: &EmailEvent,
        mut log: MessageLog,
        answer: Option<&str>,
    ) -> Result<Dispatched, Error> {
        let pending: Option<String> = log
            .unanswered_calls()
            .into_iter()
            .find(|c| c.name == tool_names::MESSAGE_USER)
            .map(|c| c.id.clone());

        match (pending, answer) {
            (Some(call_id), Some(text)) => {
                log.push(Message::tool_result(
                    call_id,
                    format!(
                        "I asked the user what we should do, this was the response: {text}"
                    ),
                ));
            }
            (Some(call_id), None) => {
                log.push(Message::tool_result(
                    call_id,
                    "The user failed to respond to the question. Please ask again.",
                ));
            }
            (None, Some(text)) => log.push(Message::human(text)),
            (None, None) => {}
        }

        let log = repair(&log).log;

        let scope = self.deps.registry.with_prompts(&PREFERENCE_KEYS)?;
        scope
            .enter(
                self.deps.prompt_store.as_ref(),
                &self.namespace,
                self.drafting_turn(email, log),
            )
            .await
            .map_err(Error::Store)?
    }

    // ── Triage ──────────────────────────────────────────────────────

    async fn run_turn(&self, email: &EmailEvent, log: MessageLog) -> Result<Dispatched, Error> {
        let decision = self.triage(email).await?;
        info!(id = %email.id, decision = decision.label(), "Triage complete");

        match decision {
            TriageDecision::No => {
                self.mark_read_quietly(email).await;
                Ok(Dispatched {
                    outcome: Outcome::Ignored,
                    log,
                })
            }
            TriageDecision::Notify => {
                if let Err(e) = self.deps.notifier.notify(&email.notification_line()).await {
                    warn!(id = %email.id, error = %e, "Notification failed");
                }
                self.mark_read_quietly(email).await;
                Ok(Dispatched {
                    outcome: Outcome::Notified,
                    log,
                })
            }
            TriageDecision::Email => self.drafting_turn(email, log).await,
        }
    }

    async fn triage(&self, email: &EmailEvent) -> Result<TriageDecision, Error> {
        if let Some(decision) = self.rules.evaluate(email) {
            return Ok(decision);
        }

        let mut conversation = MessageLog::new();
        conversation.push(Message::system(build_triage_system_prompt(&self.profile)?));
        conversation.push(Message::human(build_email_input(email)));

        let response = self
            .deps
            .drafter
            .draft(&conversation, &[triage_tool()])
            .await
            .map_err(Error::Llm)?;
        Ok(parse_triage_response(&response))
    }

    /// Mark-read on the no/notify paths, where there is no conversation to
    /// surface a failure into.
    async fn mark_read_quietly(&self, email: &EmailEvent) {
        if let Err(e) = self.deps.email.mark_read(&email.id).await {
            warn!(id = %email.id, error = %e, "Failed to mark email as read");
        }
    }

    // ── Drafting ────────────────────────────────────────────────────

    async fn drafting_turn(
        &self,
        email: &EmailEvent,
        mut log: MessageLog,
    ) -> Result<Dispatched, Error> {
        if log.is_empty() {
            log.push(Message::system(build_draft_system_prompt(&self.profile)?));
            log.push(Message::human(build_email_input(email)));
        }

        let response = self
            .deps
            .drafter
            .draft(&log, &drafting_tools())
            .await
            .map_err(Error::Llm)?;
        log.push(response.clone());

        let Some(call) = response.tool_calls.first().cloned() else {
            debug!(id = %email.id, "Model replied with plain text; nothing to execute");
            return Ok(Dispatched {
                outcome: Outcome::Drafted,
                log,
            });
        };

        self.act(email, &call, log).await
    }

    // ── Act ─────────────────────────────────────────────────────────

    async fn act(
        &self,
        email: &EmailEvent,
        call: &ToolCall,
        mut log: MessageLog,
    ) -> Result<Dispatched, Error> {
        let action = Action::from_tool_name(&call.name)?;
        debug!(id = %email.id, tool = %call.name, action = ?action, "Executing drafted action");

        match action {
            Action::AskUser => {
                // Suspend with the call pending. If the user never answers
                // and a new email arrives first, repair supersedes it.
                info!(id = %email.id, "Awaiting user guidance");
                Ok(Dispatched {
                    outcome: Outcome::AwaitingUser,
                    log,
                })
            }
            Action::Rewrite => self.rewrite(email, call, log).await,
            Action::Send => {
                let text = self.send_reply(email, &call.args).await;
                log.push(Message::tool_result(&call.id, text));
                Ok(Dispatched {
                    outcome: Outcome::Acted { action },
                    log,
                })
            }
            Action::StartThread => {
                let text = self.start_thread(&call.args).await;
                log.push(Message::tool_result(&call.id, text));
                Ok(Dispatched {
                    outcome: Outcome::Acted { action },
                    log,
                })
            }
            Action::Schedule => {
                let text = self.send_invite(&call.args).await;
                log.push(Message::tool_result(&call.id, text));
                Ok(Dispatched {
                    outcome: Outcome::Acted { action },
                    log,
                })
            }
            Action::MarkRead => {
                let text = match self.deps.email.mark_read(&email.id).await {
                    Ok(()) => "Successfully marked an email as read".to_string(),
                    Err(e) => format!("Error marking email as read: {e}"),
                };
                log.push(Message::tool_result(&call.id, text));
                Ok(Dispatched {
                    outcome: Outcome::Acted { action },
                    log,
                })
            }
        }
    }

    async fn send_reply(&self, email: &EmailEvent, args: &serde_json::Value) -> String {
        #[derive(Deserialize)]
        struct Args {
            content: String,
            #[serde(default)]
            new_recipients: Vec<String>,
        }
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return format!("Error sending email: invalid arguments: {e}"),
        };

        let mut to = vec![email.from_email.clone()];
        to.extend(args.new_recipients);
        let outgoing = OutgoingEmail {
            to,
            subject: email.subject.clone(),
            body: args.content,
            reply_to_message_id: Some(email.id.clone()),
        };
        match self.deps.email.send(outgoing).await {
            Ok(()) => "Successfully sent an email response".to_string(),
            Err(e) => format!("Error sending email: {e}"),
        }
    }

    async fn start_thread(&self, args: &serde_json::Value) -> String {
        #[derive(Deserialize)]
        struct Args {
            content: String,
            subject: String,
            recipients: Vec<String>,
        }
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return format!("Error sending email: invalid arguments: {e}"),
        };

        let outgoing = OutgoingEmail {
            to: args.recipients,
            subject: args.subject,
            body: args.content,
            reply_to_message_id: None,
        };
        match self.deps.email.send(outgoing).await {
            Ok(()) => "Successfully started a new email thread".to_string(),
            Err(e) => format!("Error sending email: {e}"),
        }
    }

    async fn send_invite(&self, args: &serde_json::Value) -> String {
        #[derive(Deserialize)]
        struct Args {
            emails: Vec<String>,
            event_title: String,
            start_time: String,
            end_time: String,
            timezone: Option<String>,
        }
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return format!("Error creating calendar event: invalid arguments: {e}"),
        };

        let invite = CalendarInvite {
            title: args.event_title,
            start_time: args.start_time,
            end_time: args.end_time,
            attendees: args.emails,
            timezone: args.timezone.unwrap_or_else(|| self.profile.timezone.clone()),
        };
        match self.deps.calendar.create_event(invite).await {
            Ok(()) => "Successfully created a calendar event".to_string(),
            Err(e) => format!("Error creating calendar event: {e}"),
        }
    }

    // ── Rewrite ─────────────────────────────────────────────────────

    /// Redraft a pending (never executed) draft in the user's tone, then
    /// act on the rewritten call. This is the pipeline's only cycle, and
    /// it re-enters the action mapping exactly once per rewrite selection.
    async fn rewrite(
        &self,
        email: &EmailEvent,
        call: &ToolCall,
        mut log: MessageLog,
    ) -> Result<Dispatched, Error> {
        let Some(target) = find_rewrite_target(&log) else {
            log.push(Message::tool_result(
                &call.id,
                "Error rewriting draft: no pending draft to rewrite",
            ));
            return Ok(Dispatched {
                outcome: Outcome::Acted {
                    action: Action::Rewrite,
                },
                log,
            });
        };

        let draft_content = target
            .call
            .args
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let tone_feedback = call
            .args
            .get("tone_feedback")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut conversation = MessageLog::new();
        conversation.push(Message::human(build_rewrite_prompt(
            &self.profile,
            &draft_content,
            email,
            tone_feedback.as_deref(),
        )?));
        let response = self
            .deps
            .drafter
            .draft(&conversation, &[])
            .await
            .map_err(Error::Llm)?;

        let rewritten = response
            .tool_calls
            .first()
            .and_then(|c| c.args.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| response.content.clone());
        if rewritten.is_empty() {
            log.push(Message::tool_result(
                &call.id,
                "Error rewriting draft: the rewrite produced no content",
            ));
            return Ok(Dispatched {
                outcome: Outcome::Acted {
                    action: Action::Rewrite,
                },
                log,
            });
        }

        // Same message id and same call id/name; only the content argument
        // changes, so tool-result linkage survives the splice.
        let mut new_args = target.call.args.clone();
        if !new_args.is_object() {
            new_args = serde_json::json!({});
        }
        new_args["content"] = serde_json::Value::String(rewritten);
        let rewritten_call =
            ToolCall::new(target.call.id.clone(), target.call.name.clone(), new_args);

        let replacement = Message {
            tool_calls: target
                .message
                .tool_calls
                .iter()
                .map(|c| {
                    if c.id == rewritten_call.id {
                        rewritten_call.clone()
                    } else {
                        c.clone()
                    }
                })
                .collect(),
            ..target.message.clone()
        };
        log.replace(target.message.id, replacement);

        log.push(Message::tool_result(
            &call.id,
            "Rewrote the draft to match the requested tone",
        ));

        // Re-enter the action mapping once with the rewritten call.
        let action = Action::from_tool_name(&rewritten_call.name)?;
        let text = match action {
            Action::Send => self.send_reply(email, &rewritten_call.args).await,
            Action::StartThread => self.start_thread(&rewritten_call.args).await,
            // find_rewrite_target only yields rewritable calls.
            _ => format!(
                "Error rewriting draft: {} cannot be executed",
                rewritten_call.name
            ),
        };

        let result = Message::tool_result(&rewritten_call.id, text);
        match target.superseded_result_id {
            // The draft's superseded marker is replaced by the real
            // execution result, keeping one result per call.
            Some(marker_id) => {
                log.replace(marker_id, result);
            }
            None => log.push(result),
        }

        Ok(Dispatched {
            outcome: Outcome::Acted { action },
            log,
        })
    }
}

// ── Rewrite target lookup ───────────────────────────────────────────

struct RewriteTarget {
    message: Message,
    call: ToolCall,
    /// Id of the superseded-marker result answering the call, when one
    /// exists (the usual case after repair).
    superseded_result_id: Option<Uuid>,
}

/// The most recent draft that never executed: a rewritable agent tool call
/// whose result is either missing or the superseded marker.
fn find_rewrite_target(log: &MessageLog) -> Option<RewriteTarget> {
    for message in log.iter().rev() {
        if message.role != Role::Agent {
            continue;
        }
        for call in &message.tool_calls {
            let rewritable = Action::from_tool_name(&call.name)
                .map(|a| a.is_rewritable())
                .unwrap_or(false);
            if !rewritable {
                continue;
            }
            let result = log
                .iter()
                .find(|m| m.tool_call_id.as_deref() == Some(call.id.as_str()));
            match result {
                None => {
                    return Some(RewriteTarget {
                        message: message.clone(),
                        call: call.clone(),
                        superseded_result_id: None,
                    });
                }
                Some(r) if r.content == SUPERSEDED_NOTE => {
                    return Some(RewriteTarget {
                        message: message.clone(),
                        call: call.clone(),
                        superseded_result_id: Some(r.id),
                    });
                }
                Some(_) => {
                    // Already executed; not rewritable.
                }
            }
        }
    }
    None
}

// ── Triage tool ─────────────────────────────────────────────────────

fn triage_tool() -> ToolDefinition {
    ToolDefinition::new(
        TRIAGE_TOOL,
        "Classify how to handle the incoming email",
        serde_json::json!({
            "type": "object",
            "properties": {
                "classification": {
                    "type": "string",
                    "enum": ["no", "notify", "email"]
                },
                "reasoning": {"type": "string"}
            },
            "required": ["classification"]
        }),
    )
}

/// Parse the triage tool call. Anything unparseable degrades to `Notify`:
/// surfacing an email the user did not need beats dropping one they did.
fn parse_triage_response(message: &Message) -> TriageDecision {
    for call in &message.tool_calls {
        if call.name != TRIAGE_TOOL {
            continue;
        }
        match call.args.get("classification").and_then(|v| v.as_str()) {
            Some("no") => return TriageDecision::No,
            Some("notify") => return TriageDecision::Notify,
            Some("email") => return TriageDecision::Email,
            other => {
                warn!(classification = ?other, "Unrecognized triage classification");
            }
        }
    }
    warn!("Triage response carried no usable classification, falling back to notify");
    TriageDecision::Notify
}
