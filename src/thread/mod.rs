//! Conversation thread model: the append-only message log and the
//! structural repair pass that restores tool-call/tool-result pairing
//! after human-in-the-loop interrupts.

pub mod message;
pub mod repair;

pub use message::{Message, MessageLog, Role, ToolCall};
pub use repair::{RepairOutcome, SUPERSEDED_NOTE, repair};
