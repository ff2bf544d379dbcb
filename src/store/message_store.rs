// src/store/message_store.rs
//! Persists and fetches DAG nodes, one `SqlitePool` shared across a single
//! logical database. `parent_ids`/`children` are set-valued columns stored
//! as JSON text, since sqlite has no native array column type.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use super::models::Message;

/// Fields needed to persist a brand-new node; `id`, `children`, and
/// `created_at` are assigned by the store on insert. Late ID assignment
/// means a caller only learns the real id after this call returns.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub reasoning: Option<String>,
    pub model: Option<String>,
    pub parent_ids: BTreeSet<String>,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, node: NewMessage) -> anyhow::Result<String>;
    async fn append_child(&self, parent_id: &str, child_id: &str) -> anyhow::Result<()>;
    async fn get(&self, id: &str) -> anyhow::Result<Option<Message>>;
    async fn get_many(&self, ids: &[String]) -> anyhow::Result<HashMap<String, Message>>;
    async fn get_by_conversation(&self, conversation_id: &str) -> anyhow::Result<Vec<Message>>;
    async fn delete_by_conversation(&self, conversation_id: &str) -> anyhow::Result<()>;
}

pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                reasoning TEXT,
                model TEXT,
                parent_ids TEXT NOT NULL,
                children TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn row_to_message(row: MessageRow) -> anyhow::Result<Message> {
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            role: row.role,
            content: row.content,
            reasoning: row.reasoning,
            model: row.model,
            parent_ids: serde_json::from_str(&row.parent_ids)?,
            children: serde_json::from_str(&row.children)?,
            created_at: row.created_at.parse()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    reasoning: Option<String>,
    model: Option<String>,
    parent_ids: String,
    children: String,
    created_at: String,
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert(&self, node: NewMessage) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let parent_ids_json = serde_json::to_string(&node.parent_ids)?;
        let empty_children: BTreeSet<String> = BTreeSet::new();
        let children_json = serde_json::to_string(&empty_children)?;

        sqlx::query(
            r#"
            INSERT INTO messages
                (id, conversation_id, role, content, reasoning, model, parent_ids, children, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&node.conversation_id)
        .bind(&node.role)
        .bind(&node.content)
        .bind(&node.reasoning)
        .bind(&node.model)
        .bind(&parent_ids_json)
        .bind(&children_json)
        .bind(now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn append_child(&self, parent_id: &str, child_id: &str) -> anyhow::Result<()> {
        // Single-writer sqlite connection gives us serializable read-modify-write;
        // union semantics fall out of re-reading the current set before writing.
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT children FROM messages WHERE id = ?")
                .bind(parent_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((children_json,)) = current else {
            anyhow::bail!("parent message {parent_id} not found");
        };

        let mut children: BTreeSet<String> = serde_json::from_str(&children_json)?;
        children.insert(child_id.to_string());
        let updated_json = serde_json::to_string(&children)?;

        sqlx::query("UPDATE messages SET children = ? WHERE id = ?")
            .bind(&updated_json)
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_message).transpose()
    }

    async fn get_many(&self, ids: &[String]) -> anyhow::Result<HashMap<String, Message>> {
        let mut out = HashMap::with_capacity(ids.len());
        // Unknown IDs are silently skipped; individual lookups avoid relying
        // on an `IN (...)` binding.
        for id in ids {
            if let Some(msg) = self.get(id).await? {
                out.insert(msg.id.clone(), msg);
            }
        }
        Ok(out)
    }

    async fn get_by_conversation(&self, conversation_id: &str) -> anyhow::Result<Vec<Message>> {
        let rows: Vec<MessageRow> =
            sqlx::query_as("SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at ASC")
                .bind(conversation_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Self::row_to_message).collect()
    }

    async fn delete_by_conversation(&self, conversation_id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteMessageStore {
        use sqlx::sqlite::SqlitePoolOptions;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteMessageStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = test_store().await;
        let id = store
            .insert(NewMessage {
                conversation_id: "c1".into(),
                role: "user".into(),
                content: "hi".into(),
                reasoning: None,
                model: None,
                parent_ids: BTreeSet::new(),
            })
            .await
            .unwrap();

        let msg = store.get(&id).await.unwrap().unwrap();
        assert_eq!(msg.content, "hi");
        assert!(msg.parent_ids.is_empty());
        assert!(msg.children.is_empty());
    }

    #[tokio::test]
    async fn append_child_is_idempotent_and_unions() {
        let store = test_store().await;
        let parent = store
            .insert(NewMessage {
                conversation_id: "c1".into(),
                role: "user".into(),
                content: "hi".into(),
                reasoning: None,
                model: None,
                parent_ids: BTreeSet::new(),
            })
            .await
            .unwrap();

        store.append_child(&parent, "child-a").await.unwrap();
        store.append_child(&parent, "child-a").await.unwrap();
        store.append_child(&parent, "child-b").await.unwrap();

        let msg = store.get(&parent).await.unwrap().unwrap();
        assert_eq!(msg.children.len(), 2);
        assert!(msg.children.contains("child-a"));
        assert!(msg.children.contains("child-b"));
    }

    #[tokio::test]
    async fn get_many_skips_unknown_ids() {
        let store = test_store().await;
        let id = store
            .insert(NewMessage {
                conversation_id: "c1".into(),
                role: "user".into(),
                content: "hi".into(),
                reasoning: None,
                model: None,
                parent_ids: BTreeSet::new(),
            })
            .await
            .unwrap();

        let found = store
            .get_many(&[id.clone(), "nonexistent".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&id));
    }

    #[tokio::test]
    async fn delete_by_conversation_removes_all_nodes() {
        let store = test_store().await;
        store
            .insert(NewMessage {
                conversation_id: "c1".into(),
                role: "user".into(),
                content: "hi".into(),
                reasoning: None,
                model: None,
                parent_ids: BTreeSet::new(),
            })
            .await
            .unwrap();

        store.delete_by_conversation("c1").await.unwrap();
        assert!(store.get_by_conversation("c1").await.unwrap().is_empty());
    }
}
