//! Structural repair of the conversation log.
//!
//! Human-in-the-loop interrupts can leave the log with agent tool calls
//! that were never answered (the user sent a fresh message instead of
//! responding), or with tool results separated from their calls by
//! interleaved messages. Model providers reject both shapes, so the log is
//! normalized here before every model call.
//!
//! Two passes:
//! 1. `pair_tool_results` pulls each call's answering result forward so it
//!    sits directly after the emitting agent message, in call order.
//!    Messages that sat between a call and its result slide after the
//!    block, keeping their original relative order.
//! 2. `synthesize_missing` answers every still-pending call with a fixed
//!    marker result so no call is left dangling.
//!
//! The pass is corrective, not validating: orphan tool results that answer
//! a call id that never existed stay where they are, and the engine never
//! fails.

use tracing::debug;

use crate::thread::message::{Message, MessageLog, Role};

/// Content of a synthesized result for a call that never executed.
pub const SUPERSEDED_NOTE: &str =
    "this tool call was superseded by a later message and did not execute";

/// Result of a repair pass.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub log: MessageLog,
    pub changed: bool,
}

impl RepairOutcome {
    /// The storage instruction for a changed log.
    ///
    /// Partial in-place edits to an already-persisted append-only log are
    /// not expressible, so a changed repair always replaces the whole log.
    pub fn patch(&self) -> Option<crate::store::LogPatch> {
        self.changed
            .then(|| crate::store::LogPatch::ReplaceAll(self.log.clone()))
    }
}

/// Restore the tool-call/tool-result pairing invariant.
///
/// Idempotent: repairing an already-repaired log reports `changed = false`
/// and returns an identical log, so callers can run it defensively at the
/// top of every turn.
pub fn repair(log: &MessageLog) -> RepairOutcome {
    let segments = pair_tool_results(log.messages());
    let repaired = MessageLog::from_messages(synthesize_missing(segments));
    let changed = repaired != *log;
    if changed {
        debug!(
            before = log.len(),
            after = repaired.len(),
            "Repaired conversation log"
        );
    }
    RepairOutcome {
        log: repaired,
        changed,
    }
}

/// One agent message together with whatever results pass 1 located for its
/// calls, in call-emission order.
struct AgentBlock {
    agent: Message,
    results: Vec<(String, Option<Message>)>,
}

enum Segment {
    Plain(Message),
    Block(AgentBlock),
}

/// Pass 1: pair each agent message's calls with their results.
///
/// Results are matched independently per call id, scanning the entire
/// remaining log, and each result is consumed at most once. Everything a
/// match skips over stays in the walk and is emitted right after the
/// block, preserving original relative order. A swallowed agent message
/// with its own calls gets the same treatment when the walk reaches it.
fn pair_tool_results(msgs: &[Message]) -> Vec<Segment> {
    let mut consumed = vec![false; msgs.len()];
    let mut segments = Vec::with_capacity(msgs.len());

    for i in 0..msgs.len() {
        if consumed[i] {
            continue;
        }
        let msg = &msgs[i];
        if msg.role == Role::Agent && !msg.tool_calls.is_empty() {
            let mut results = Vec::with_capacity(msg.tool_calls.len());
            for call in &msg.tool_calls {
                let found = (i + 1..msgs.len()).find(|&j| {
                    !consumed[j]
                        && msgs[j].role == Role::ToolResult
                        && msgs[j].tool_call_id.as_deref() == Some(call.id.as_str())
                });
                if let Some(j) = found {
                    consumed[j] = true;
                }
                results.push((call.id.clone(), found.map(|j| msgs[j].clone())));
            }
            segments.push(Segment::Block(AgentBlock {
                agent: msg.clone(),
                results,
            }));
        } else {
            segments.push(Segment::Plain(msg.clone()));
        }
    }
    segments
}

/// Pass 2: flatten the paired segments, answering every call that pass 1
/// left pending with a synthetic superseded marker.
fn synthesize_missing(segments: Vec<Segment>) -> Vec<Message> {
    let mut out = Vec::new();
    for segment in segments {
        match segment {
            Segment::Plain(m) => out.push(m),
            Segment::Block(block) => {
                out.push(block.agent);
                for (call_id, result) in block.results {
                    out.push(result.unwrap_or_else(|| {
                        Message::tool_result(call_id, SUPERSEDED_NOTE)
                    }));
                }
            }
        }
    }
    out
}
