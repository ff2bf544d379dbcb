// src/store/conversation_store.rs
//! Persists conversation metadata, scoped by `(id, user_id)` so a caller can
//! never mutate another user's conversation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{Conversation, MAX_TITLE_LEN};

#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, user_id: &str, initial_model: &str) -> anyhow::Result<Conversation>;
    async fn get(&self, id: &str) -> anyhow::Result<Option<Conversation>>;
    async fn list(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<(Vec<Conversation>, u64)>;
    async fn rename(&self, id: &str, user_id: &str, title: &str) -> anyhow::Result<bool>;
    async fn delete(&self, id: &str, user_id: &str) -> anyhow::Result<DeleteOutcome>;
    async fn touch(&self, id: &str, model: &str) -> anyhow::Result<()>;
    async fn set_title(&self, id: &str, title: &str) -> anyhow::Result<()>;
}

pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                models TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn row_to_conversation(row: ConversationRow) -> anyhow::Result<Conversation> {
        Ok(Conversation {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            models: serde_json::from_str(&row.models)?,
            created_at: row.created_at.parse()?,
            updated_at: row.updated_at.parse()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    user_id: String,
    title: String,
    models: String,
    created_at: String,
    updated_at: String,
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create(&self, user_id: &str, initial_model: &str) -> anyhow::Result<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let models = vec![initial_model.to_string()];
        let models_json = serde_json::to_string(&models)?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, title, models, created_at, updated_at)
            VALUES (?, ?, '', ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&models_json)
        .bind(now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
        .bind(now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
        .execute(&self.pool)
        .await?;

        Ok(Conversation {
            id,
            user_id: user_id.to_string(),
            title: String::new(),
            models,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<Conversation>> {
        let row: Option<ConversationRow> =
            sqlx::query_as("SELECT * FROM conversations WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_conversation).transpose()
    }

    async fn list(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<(Vec<Conversation>, u64)> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 200);
        let offset = (page - 1) as i64 * page_size as i64;

        let rows: Vec<ConversationRow> = sqlx::query_as(
            r#"
            SELECT * FROM conversations
            WHERE user_id = ?
            ORDER BY updated_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(Self::row_to_conversation)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok((items, total.0 as u64))
    }

    async fn rename(&self, id: &str, user_id: &str, title: &str) -> anyhow::Result<bool> {
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            anyhow::bail!("title must be 1-{MAX_TITLE_LEN} characters");
        }

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE conversations SET title = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(title)
        .bind(now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str, user_id: &str) -> anyhow::Result<DeleteOutcome> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }

    async fn touch(&self, id: &str, model: &str) -> anyhow::Result<()> {
        let Some(convo) = self.get(id).await? else {
            anyhow::bail!("conversation {id} not found");
        };

        let mut models = convo.models;
        if !models.iter().any(|m| m == model) {
            models.push(model.to_string());
        }
        let models_json = serde_json::to_string(&models)?;
        let now = Utc::now();

        sqlx::query("UPDATE conversations SET models = ?, updated_at = ? WHERE id = ?")
            .bind(&models_json)
            .bind(now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_title(&self, id: &str, title: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE conversations SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
