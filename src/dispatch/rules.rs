//! Pre-LLM triage rules for fast pattern matching.
//!
//! Runs before the model triage step to short-circuit obvious cases:
//! - noreply/no-reply and mailer-daemon senders
//! - marketing/newsletter domains
//! - "unsubscribe" subjects
//!
//! If a rule matches, the model call is skipped entirely.

use regex::Regex;
use tracing::debug;

use crate::dispatch::types::{EmailEvent, TriageDecision};

/// Which field a rule matches against.
#[derive(Debug, Clone, Copy)]
enum RuleField {
    Sender,
    Subject,
}

/// A single fast-path rule with a compiled regex.
struct TriageRule {
    regex: Regex,
    field: RuleField,
    decision: TriageDecision,
    reason: &'static str,
}

/// Fast-path triage rules.
pub struct TriageRules {
    rules: Vec<TriageRule>,
}

impl TriageRules {
    /// No rules; every email goes to the model.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The default rule set.
    pub fn default_rules() -> Self {
        let rules = vec![
            TriageRule {
                regex: Regex::new(r"(?i)^no[\-_.]?reply@").unwrap(),
                field: RuleField::Sender,
                decision: TriageDecision::No,
                reason: "noreply sender",
            },
            TriageRule {
                regex: Regex::new(r"(?i)^(mailer[\-_]?daemon|postmaster)@").unwrap(),
                field: RuleField::Sender,
                decision: TriageDecision::No,
                reason: "automated mail system",
            },
            TriageRule {
                regex: Regex::new(r"(?i)@(marketing|newsletter|promo|campaign)\b").unwrap(),
                field: RuleField::Sender,
                decision: TriageDecision::No,
                reason: "marketing/newsletter sender",
            },
            TriageRule {
                regex: Regex::new(r"(?i)\bunsubscribe\b").unwrap(),
                field: RuleField::Subject,
                decision: TriageDecision::No,
                reason: "unsubscribe subject",
            },
        ];
        Self { rules }
    }

    /// Evaluate the rules against an email. `None` means no rule matched
    /// and the model triage should run.
    pub fn evaluate(&self, email: &EmailEvent) -> Option<TriageDecision> {
        for rule in &self.rules {
            let haystack = match rule.field {
                RuleField::Sender => &email.from_email,
                RuleField::Subject => &email.subject,
            };
            if rule.regex.is_match(haystack) {
                debug!(
                    id = %email.id,
                    reason = rule.reason,
                    decision = rule.decision.label(),
                    "Triage rule matched"
                );
                return Some(rule.decision);
            }
        }
        None
    }
}

impl Default for TriageRules {
    fn default() -> Self {
        Self::default_rules()
    }
}
