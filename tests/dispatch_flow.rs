//! End-to-end dispatcher flows: suspension, abandonment, repair, and
//! registry lazy-init against both store backends.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use exec_assist::config::AssistantProfile;
use exec_assist::dispatch::{
    Action, Dispatcher, DispatcherDeps, EmailEvent, Outcome, TriageRules,
};
use exec_assist::error::{LlmError, ProviderError};
use exec_assist::llm::{Drafter, ToolDefinition};
use exec_assist::providers::{
    CalendarEvent, CalendarInvite, CalendarProvider, EmailProvider, Notifier, OutgoingEmail,
};
use exec_assist::registry::{Registry, default_prompts, keys};
use exec_assist::store::{LibSqlBackend, MemoryStore, Namespace, PromptStore};
use exec_assist::thread::{Message, MessageLog, Role, SUPERSEDED_NOTE, ToolCall};

// ── Mocks ───────────────────────────────────────────────────────────

struct ScriptedDrafter {
    responses: Mutex<VecDeque<Message>>,
}

impl ScriptedDrafter {
    fn new(responses: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl Drafter for ScriptedDrafter {
    async fn draft(
        &self,
        _conversation: &MessageLog,
        _tools: &[ToolDefinition],
    ) -> Result<Message, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::RequestFailed {
                reason: "script exhausted".into(),
            })
    }
}

#[derive(Default)]
struct RecordingEmail {
    sent: Mutex<Vec<OutgoingEmail>>,
    marked_read: Mutex<Vec<String>>,
}

#[async_trait]
impl EmailProvider for RecordingEmail {
    async fn send(&self, email: OutgoingEmail) -> Result<(), ProviderError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), ProviderError> {
        self.marked_read.lock().unwrap().push(message_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct NoCalendar;

#[async_trait]
impl CalendarProvider for NoCalendar {
    async fn create_event(&self, _invite: CalendarInvite) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn list_events_for_day(&self, _date: &str) -> Result<Vec<CalendarEvent>, ProviderError> {
        Ok(vec![])
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<(), ProviderError> {
        self.notices.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

fn triage_reply(classification: &str) -> Message {
    Message::agent(
        "",
        vec![ToolCall::new(
            "t-call",
            "triage_email",
            json!({"classification": classification}),
        )],
    )
}

fn email_event(id: &str, subject: &str) -> EmailEvent {
    EmailEvent {
        id: id.into(),
        thread_id: "thread-1".into(),
        from_email: "alice@example.com".into(),
        to_email: "user@example.com".into(),
        subject: subject.into(),
        body: "Can you send over the figures?".into(),
        send_time: Utc::now(),
    }
}

struct World {
    dispatcher: Dispatcher,
    email_provider: Arc<RecordingEmail>,
    notifier: Arc<RecordingNotifier>,
    prompt_store: Arc<dyn PromptStore>,
}

fn world(responses: Vec<Message>, prompt_store: Arc<dyn PromptStore>) -> World {
    let registry = Arc::new(Registry::new());
    registry.register(default_prompts()).unwrap();
    let email_provider = Arc::new(RecordingEmail::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let deps = DispatcherDeps {
        registry,
        prompt_store: prompt_store.clone(),
        drafter: ScriptedDrafter::new(responses),
        email: email_provider.clone(),
        calendar: Arc::new(NoCalendar),
        notifier: notifier.clone(),
    };
    let dispatcher = Dispatcher::new(
        deps,
        AssistantProfile::default(),
        Namespace::new(["user-1", "assistant-a"]),
    )
    .with_rules(TriageRules::empty());

    World {
        dispatcher,
        email_provider,
        notifier,
        prompt_store,
    }
}

// ── Flows ───────────────────────────────────────────────────────────

#[tokio::test]
async fn suspended_turn_resumes_with_user_answer() {
    let w = world(
        vec![
            triage_reply("email"),
            Message::agent(
                "",
                vec![ToolCall::new(
                    "ask-1",
                    "message_user",
                    json!({"question": "Alice wants the figures. Send the Q3 sheet?"}),
                )],
            ),
            Message::agent(
                "",
                vec![ToolCall::new(
                    "c-1",
                    "write_email_response",
                    json!({"content": "Figures attached."}),
                )],
            ),
        ],
        Arc::new(MemoryStore::new()),
    );
    let email = email_event("m-1", "Figures?");

    let suspended = w.dispatcher.dispatch(&email, MessageLog::new()).await.unwrap();
    assert_eq!(suspended.outcome, Outcome::AwaitingUser);
    assert_eq!(suspended.log.unanswered_calls().len(), 1);

    let resumed = w
        .dispatcher
        .resume_with_answer(&email, suspended.log, Some("yes, send it"))
        .await
        .unwrap();
    assert_eq!(resumed.outcome, Outcome::Acted { action: Action::Send });
    assert!(resumed.log.is_paired());
    assert_eq!(w.email_provider.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn abandoned_suspension_is_superseded_on_next_dispatch() {
    // Turn 1 suspends asking the user. The user never answers; a follow-up
    // email arrives on the thread and a fresh human message lands in the
    // log. The next dispatch must repair the dangling ask before drafting.
    let w = world(
        vec![
            triage_reply("email"),
            Message::agent(
                "",
                vec![ToolCall::new(
                    "ask-1",
                    "message_user",
                    json!({"question": "Should I reply?"}),
                )],
            ),
            triage_reply("email"),
            Message::agent(
                "",
                vec![ToolCall::new(
                    "c-2",
                    "write_email_response",
                    json!({"content": "Here you go."}),
                )],
            ),
        ],
        Arc::new(MemoryStore::new()),
    );

    let first = email_event("m-1", "Figures?");
    let suspended = w.dispatcher.dispatch(&first, MessageLog::new()).await.unwrap();
    assert_eq!(suspended.outcome, Outcome::AwaitingUser);

    // The follow-up email's text is appended as plain human input, leaving
    // the ask call dangling.
    let mut log = suspended.log;
    log.push(Message::human("Never mind the last question - just send them today."));

    let second = email_event("m-2", "Re: Figures?");
    let result = w.dispatcher.dispatch(&second, log).await.unwrap();
    assert_eq!(result.outcome, Outcome::Acted { action: Action::Send });

    // The abandoned ask was answered synthetically, right after its call.
    let ask_result = result
        .log
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("ask-1"))
        .expect("dangling ask answered");
    assert_eq!(ask_result.content, SUPERSEDED_NOTE);
    assert!(result.log.is_paired());
    assert!(result.log.unanswered_calls().is_empty());

    // The human interjection survived, after the synthesized pair.
    let contents: Vec<&str> = result.log.iter().map(|m| m.content.as_str()).collect();
    assert!(contents.contains(&"Never mind the last question - just send them today."));
}

#[tokio::test]
async fn dispatch_lazily_initializes_preference_defaults() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let w = world(vec![triage_reply("no")], store.clone());
    let email = email_event("m-1", "Newsletter");

    let result = w.dispatcher.dispatch(&email, MessageLog::new()).await.unwrap();
    assert_eq!(result.outcome, Outcome::Ignored);

    // All four preference keys were initialized from their registered
    // defaults for this namespace, even though only triage ran.
    let ns = Namespace::new(["user-1", "assistant-a"]);
    for key in [
        keys::REWRITE_INSTRUCTIONS,
        keys::BACKGROUND_PREFERENCES,
        keys::RESPONSE_PREFERENCES,
        keys::SCHEDULE_PREFERENCES,
    ] {
        let entry = w
            .prompt_store
            .get(&ns, key)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{key} not initialized"));
        assert!(!entry.data.is_empty());
    }

    // A different namespace is untouched.
    let other = Namespace::new(["user-2", "assistant-a"]);
    assert!(store.get(&other, keys::REWRITE_INSTRUCTIONS).await.unwrap().is_none());
}

#[tokio::test]
async fn stored_preferences_shape_the_draft_system_prompt() {
    // Seed a learned tone value, then check the drafting conversation the
    // model received contains it (via a drafter that records its input).
    struct CapturingDrafter {
        responses: Mutex<VecDeque<Message>>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Drafter for CapturingDrafter {
        async fn draft(
            &self,
            conversation: &MessageLog,
            _tools: &[ToolDefinition],
        ) -> Result<Message, LlmError> {
            let rendered = conversation
                .iter()
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
                .join("\n---\n");
            self.seen.lock().unwrap().push(rendered);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(LlmError::RequestFailed {
                    reason: "script exhausted".into(),
                })
        }
    }

    let store = Arc::new(MemoryStore::new());
    let ns = Namespace::new(["user-1", "assistant-a"]);
    store
        .put(
            &ns,
            keys::RESPONSE_PREFERENCES,
            exec_assist::store::RegistryEntry::new("Always confirm deadlines explicitly."),
        )
        .await
        .unwrap();

    let registry = Arc::new(Registry::new());
    registry.register(default_prompts()).unwrap();
    let drafter = Arc::new(CapturingDrafter {
        responses: Mutex::new(
            vec![
                triage_reply("email"),
                Message::agent("Noted, will reply Monday.", vec![]),
            ]
            .into(),
        ),
        seen: Mutex::new(Vec::new()),
    });

    let deps = DispatcherDeps {
        registry,
        prompt_store: store,
        drafter: drafter.clone(),
        email: Arc::new(RecordingEmail::default()),
        calendar: Arc::new(NoCalendar),
        notifier: Arc::new(RecordingNotifier::default()),
    };
    let dispatcher = Dispatcher::new(deps, AssistantProfile::default(), ns)
        .with_rules(TriageRules::empty());

    let result = dispatcher
        .dispatch(&email_event("m-1", "Deadline"), MessageLog::new())
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::Drafted);

    let seen = drafter.seen.lock().unwrap();
    // Second model call is the drafting one; its system prompt carries the
    // learned preference value instead of the default.
    assert!(seen[1].contains("Always confirm deadlines explicitly."));
}

#[tokio::test]
async fn notify_path_reaches_notifier_and_marks_read() {
    let w = world(vec![triage_reply("notify")], Arc::new(MemoryStore::new()));
    let email = email_event("m-9", "FYI: deploy finished");

    let result = w.dispatcher.dispatch(&email, MessageLog::new()).await.unwrap();
    assert_eq!(result.outcome, Outcome::Notified);
    assert_eq!(
        w.notifier.notices.lock().unwrap().as_slice(),
        ["You got a message from alice@example.com: FYI: deploy finished"]
    );
    assert_eq!(w.email_provider.marked_read.lock().unwrap().as_slice(), ["m-9"]);
}

#[tokio::test]
async fn dispatch_works_against_libsql_prompt_store() {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let w = world(
        vec![
            triage_reply("email"),
            Message::agent(
                "",
                vec![ToolCall::new(
                    "c-1",
                    "write_email_response",
                    json!({"content": "On it."}),
                )],
            ),
        ],
        store.clone(),
    );
    let email = email_event("m-1", "Quick ask");

    let result = w.dispatcher.dispatch(&email, MessageLog::new()).await.unwrap();
    assert_eq!(result.outcome, Outcome::Acted { action: Action::Send });

    // Defaults were durably initialized through the libSQL backend.
    let ns = Namespace::new(["user-1", "assistant-a"]);
    let entry = store.get(&ns, keys::SCHEDULE_PREFERENCES).await.unwrap().unwrap();
    assert!(entry.data.contains("calendar invites"));

    // The produced log round-trips through the thread store unchanged.
    let thread_id = uuid::Uuid::new_v4();
    exec_assist::store::ThreadStore::apply(
        store.as_ref(),
        thread_id,
        exec_assist::store::LogPatch::ReplaceAll(result.log.clone()),
    )
    .await
    .unwrap();
    let loaded = exec_assist::store::ThreadStore::load(store.as_ref(), thread_id)
        .await
        .unwrap();
    assert_eq!(loaded, result.log);
    assert_eq!(loaded.messages()[0].role, Role::System);
}
