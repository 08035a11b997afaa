//! libSQL backend implementing `PromptStore` and `ThreadStore`.
//!
//! Supports local file and in-memory databases. Messages are stored one
//! JSON row per message, ordered by a per-thread sequence number.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{LogPatch, Namespace, PromptStore, RegistryEntry, ThreadStore, migrations};
use crate::thread::{Message, MessageLog};

/// libSQL database backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Store opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl PromptStore for LibSqlBackend {
    async fn get(
        &self,
        namespace: &Namespace,
        key: &str,
    ) -> Result<Option<RegistryEntry>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT data FROM prompt_values WHERE namespace = ?1 AND prompt_key = ?2",
                params![namespace.to_string(), key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("prompt get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let data: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("prompt get row parse: {e}")))?;
                Ok(Some(RegistryEntry { data }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("prompt get: {e}"))),
        }
    }

    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        entry: RegistryEntry,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        // Single upsert statement, atomic per (namespace, key).
        self.conn()
            .execute(
                "INSERT INTO prompt_values (namespace, prompt_key, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, prompt_key)
                 DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                params![namespace.to_string(), key, entry.data, now],
            )
            .await
            .map_err(|e| StoreError::Query(format!("prompt put: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for LibSqlBackend {
    async fn load(&self, thread_id: Uuid) -> Result<MessageLog, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT message FROM thread_messages WHERE thread_id = ?1 ORDER BY seq",
                params![thread_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("thread load: {e}")))?;

        let mut messages = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let raw: String = row
                        .get(0)
                        .map_err(|e| StoreError::Query(format!("thread load row parse: {e}")))?;
                    let message: Message = serde_json::from_str(&raw)
                        .map_err(|e| StoreError::Serialization(format!("thread load: {e}")))?;
                    messages.push(message);
                }
                Ok(None) => break,
                Err(e) => return Err(StoreError::Query(format!("thread load: {e}"))),
            }
        }
        Ok(MessageLog::from_messages(messages))
    }

    async fn apply(&self, thread_id: Uuid, patch: LogPatch) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| StoreError::Query(format!("thread apply begin: {e}")))?;

        match patch {
            LogPatch::Append(messages) => {
                let mut rows = tx
                    .query(
                        "SELECT COALESCE(MAX(seq), -1) FROM thread_messages WHERE thread_id = ?1",
                        params![thread_id.to_string()],
                    )
                    .await
                    .map_err(|e| StoreError::Query(format!("thread apply seq: {e}")))?;
                let mut next_seq: i64 = match rows.next().await {
                    Ok(Some(row)) => row.get::<i64>(0).unwrap_or(-1) + 1,
                    _ => 0,
                };

                for message in &messages {
                    insert_message(&tx, thread_id, next_seq, message, &now).await?;
                    next_seq += 1;
                }
            }
            LogPatch::ReplaceAll(log) => {
                tx.execute(
                    "DELETE FROM thread_messages WHERE thread_id = ?1",
                    params![thread_id.to_string()],
                )
                .await
                .map_err(|e| StoreError::Query(format!("thread apply delete: {e}")))?;

                for (seq, message) in log.iter().enumerate() {
                    insert_message(&tx, thread_id, seq as i64, message, &now).await?;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(format!("thread apply commit: {e}")))
    }
}

async fn insert_message(
    conn: &Connection,
    thread_id: Uuid,
    seq: i64,
    message: &Message,
    now: &str,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(message)
        .map_err(|e| StoreError::Serialization(format!("thread apply: {e}")))?;
    conn.execute(
        "INSERT INTO thread_messages (thread_id, seq, message, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![thread_id.to_string(), seq, raw, now],
    )
    .await
    .map_err(|e| StoreError::Query(format!("thread apply insert: {e}")))?;
    Ok(())
}
