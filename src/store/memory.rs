//! In-memory store backend, used in tests and single-process embedding.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{LogPatch, Namespace, PromptStore, RegistryEntry, ThreadStore};
use crate::thread::MessageLog;

/// Non-durable backend holding everything behind async locks.
#[derive(Default)]
pub struct MemoryStore {
    prompts: RwLock<HashMap<(Namespace, String), RegistryEntry>>,
    threads: RwLock<HashMap<Uuid, MessageLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored preference entries, across all namespaces.
    pub async fn prompt_count(&self) -> usize {
        self.prompts.read().await.len()
    }
}

#[async_trait]
impl PromptStore for MemoryStore {
    async fn get(
        &self,
        namespace: &Namespace,
        key: &str,
    ) -> Result<Option<RegistryEntry>, StoreError> {
        let prompts = self.prompts.read().await;
        Ok(prompts.get(&(namespace.clone(), key.to_string())).cloned())
    }

    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        entry: RegistryEntry,
    ) -> Result<(), StoreError> {
        let mut prompts = self.prompts.write().await;
        prompts.insert((namespace.clone(), key.to_string()), entry);
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for MemoryStore {
    async fn load(&self, thread_id: Uuid) -> Result<MessageLog, StoreError> {
        let threads = self.threads.read().await;
        Ok(threads.get(&thread_id).cloned().unwrap_or_default())
    }

    async fn apply(&self, thread_id: Uuid, patch: LogPatch) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        match patch {
            LogPatch::Append(messages) => {
                let log = threads.entry(thread_id).or_default();
                for message in messages {
                    log.push(message);
                }
            }
            LogPatch::ReplaceAll(log) => {
                threads.insert(thread_id, log);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Message;

    #[tokio::test]
    async fn test_prompt_get_put_round_trip() {
        let store = MemoryStore::new();
        let ns = Namespace::new(["user-1"]);

        assert!(store.get(&ns, "tone").await.unwrap().is_none());

        store
            .put(&ns, "tone", RegistryEntry::new("be casual"))
            .await
            .unwrap();
        let entry = store.get(&ns, "tone").await.unwrap().unwrap();
        assert_eq!(entry.data, "be casual");

        // Other namespaces never see it.
        let other = Namespace::new(["user-2"]);
        assert!(store.get(&other, "tone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_last_writer_wins() {
        let store = MemoryStore::new();
        let ns = Namespace::new(["user-1"]);

        store
            .put(&ns, "tone", RegistryEntry::new("first"))
            .await
            .unwrap();
        store
            .put(&ns, "tone", RegistryEntry::new("second"))
            .await
            .unwrap();
        assert_eq!(store.get(&ns, "tone").await.unwrap().unwrap().data, "second");
        assert_eq!(store.prompt_count().await, 1);
    }

    #[tokio::test]
    async fn test_thread_append_and_replace() {
        let store = MemoryStore::new();
        let thread_id = Uuid::new_v4();

        assert!(store.load(thread_id).await.unwrap().is_empty());

        store
            .apply(
                thread_id,
                LogPatch::Append(vec![Message::system("s"), Message::human("h")]),
            )
            .await
            .unwrap();
        assert_eq!(store.load(thread_id).await.unwrap().len(), 2);

        let replacement = MessageLog::from_messages(vec![Message::system("rewritten")]);
        store
            .apply(thread_id, LogPatch::ReplaceAll(replacement.clone()))
            .await
            .unwrap();
        assert_eq!(store.load(thread_id).await.unwrap(), replacement);
    }
}
