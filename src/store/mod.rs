//! Persistence layer: backend-agnostic traits for preference values and
//! conversation threads, with in-memory and libSQL backends.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::thread::{Message, MessageLog};

/// Ordered identifiers partitioning the preference key space, e.g.
/// `(user_id, assistant_id)`. Two namespaces never see each other's values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(Vec<String>);

impl Namespace {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Sub-scope this namespace with one more identifier.
    pub fn child(&self, part: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.push(part.into());
        Self(parts)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// A durable preference value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub data: String,
}

impl RegistryEntry {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

/// Storage instruction for a conversation thread.
///
/// `Append` is the normal-operation shape. `ReplaceAll` is emitted by the
/// repair engine: a corrected log replaces the persisted one atomically,
/// since readers must never observe a partially-rewritten log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogPatch {
    Append(Vec<Message>),
    ReplaceAll(MessageLog),
}

/// Durable key-value store for preference values.
///
/// `put` must be atomic per `(namespace, key)`; concurrent writers resolve
/// by last-writer-wins.
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn get(
        &self,
        namespace: &Namespace,
        key: &str,
    ) -> Result<Option<RegistryEntry>, StoreError>;

    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        entry: RegistryEntry,
    ) -> Result<(), StoreError>;
}

/// Durable storage for conversation threads.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Load a thread's log. An unknown thread is an empty log.
    async fn load(&self, thread_id: Uuid) -> Result<MessageLog, StoreError>;

    /// Apply a patch to a thread's log atomically.
    async fn apply(&self, thread_id: Uuid, patch: LogPatch) -> Result<(), StoreError>;
}
