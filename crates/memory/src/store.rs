use chrono::{DateTime, Utc};
use px_domain::{Error, Result};
use px_proto::memory::RichMessage;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::history;

#[derive(Debug, Clone)]
pub struct MemoryBucket {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub project_id: Uuid,
    pub memory_type: String,
    pub config: serde_json::Value,
    pub message_count: i32,
    pub token_count: i32,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryBucket {
    pub fn window_k(&self) -> usize {
        self.config
            .get("k")
            .and_then(|v| v.as_u64())
            .map(|k| k as usize)
            .unwrap_or(history::BUFFER_WINDOW_DEFAULT_K)
    }
}

fn row_to_bucket(row: &sqlx::postgres::PgRow) -> MemoryBucket {
    MemoryBucket {
        id: row.get("id"),
        name: row.get("name"),
        owner_id: row.get("owner_id"),
        project_id: row.get("project_id"),
        memory_type: row.get("memory_type"),
        config: row.get("config"),
        message_count: row.get("message_count"),
        token_count: row.get("token_count"),
        summary: row.get("summary"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const BUCKET_COLUMNS: &str = "id, name, owner_id, project_id, memory_type, config, \
                              message_count, token_count, summary, created_at, updated_at";

/// Result of an idempotent batch append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Added(usize),
    Duplicate,
}

#[derive(Clone)]
pub struct MemoryStore {
    pool: PgPool,
}

impl MemoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS memory_buckets (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                owner_id UUID NOT NULL,
                project_id UUID NOT NULL,
                memory_type TEXT NOT NULL DEFAULT 'conversation_buffer_window',
                config JSONB NOT NULL DEFAULT '{}',
                message_count INTEGER NOT NULL DEFAULT 0,
                token_count INTEGER NOT NULL DEFAULT 0,
                summary TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS memory_buckets_owner ON memory_buckets (owner_id);
            CREATE INDEX IF NOT EXISTS memory_buckets_project ON memory_buckets (project_id);
            CREATE TABLE IF NOT EXISTS memory_messages (
                id UUID PRIMARY KEY,
                bucket_id UUID NOT NULL REFERENCES memory_buckets(id) ON DELETE CASCADE,
                content JSONB NOT NULL,
                idempotency_key UUID UNIQUE,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS memory_messages_bucket
                ON memory_messages (bucket_id, timestamp);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn create_bucket(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
        name: &str,
        memory_type: &str,
        config: serde_json::Value,
    ) -> Result<MemoryBucket> {
        let row = sqlx::query(&format!(
            "INSERT INTO memory_buckets (id, name, owner_id, project_id, memory_type, config)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {BUCKET_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(owner_id)
        .bind(project_id)
        .bind(memory_type)
        .bind(config)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row_to_bucket(&row))
    }

    pub async fn find_bucket(&self, id: Uuid) -> Result<Option<MemoryBucket>> {
        let row = sqlx::query(&format!(
            "SELECT {BUCKET_COLUMNS} FROM memory_buckets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_bucket))
    }

    pub async fn find_buckets(&self, ids: &[Uuid]) -> Result<Vec<MemoryBucket>> {
        let rows = sqlx::query(&format!(
            "SELECT {BUCKET_COLUMNS} FROM memory_buckets WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_bucket).collect())
    }

    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<MemoryBucket>> {
        let rows = sqlx::query(&format!(
            "SELECT {BUCKET_COLUMNS} FROM memory_buckets WHERE owner_id = $1 ORDER BY created_at"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_bucket).collect())
    }

    pub async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<MemoryBucket>> {
        let rows = sqlx::query(&format!(
            "SELECT {BUCKET_COLUMNS} FROM memory_buckets WHERE project_id = $1"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_bucket).collect())
    }

    pub async fn delete_bucket(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM memory_buckets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Ordered message contents for a bucket.
    pub async fn messages(&self, bucket_id: Uuid) -> Result<Vec<RichMessage>> {
        let rows = sqlx::query(
            "SELECT content FROM memory_messages WHERE bucket_id = $1 ORDER BY timestamp",
        )
        .bind(bucket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let content: serde_json::Value = row.get("content");
            match serde_json::from_value(content) {
                Ok(msg) => out.push(msg),
                Err(e) => tracing::warn!(%bucket_id, error = %e, "skipping unreadable message"),
            }
        }
        Ok(out)
    }

    /// Idempotent batch append. Only the first message of the batch
    /// carries the idempotency key; a replay hits either the advisory
    /// check or the unique index and reports `Duplicate`.
    pub async fn append_messages(
        &self,
        bucket: &MemoryBucket,
        idempotency_key: Uuid,
        messages: &[RichMessage],
    ) -> Result<AppendOutcome> {
        if messages.is_empty() {
            return Ok(AppendOutcome::Added(0));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err)?;

        let seen = sqlx::query("SELECT 1 AS one FROM memory_messages WHERE idempotency_key = $1")
            .bind(idempotency_key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if seen.is_some() {
            return Ok(AppendOutcome::Duplicate);
        }

        for (i, msg) in messages.iter().enumerate() {
            let key = if i == 0 { Some(idempotency_key) } else { None };
            let result = sqlx::query(
                "INSERT INTO memory_messages (id, bucket_id, content, idempotency_key)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(bucket.id)
            .bind(serde_json::to_value(msg)?)
            .bind(key)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    // Lost a race with a concurrent replay.
                    return Ok(AppendOutcome::Duplicate);
                }
                Err(e) => return Err(db_err(e)),
            }
        }

        let added_tokens = history::estimate_tokens(messages) as i32;
        let new_summary = if bucket.memory_type == "conversation_summary" {
            history::fold_summary(&bucket.summary, messages)
        } else {
            bucket.summary.clone()
        };

        sqlx::query(
            "UPDATE memory_buckets
             SET message_count = message_count + $2,
                 token_count = token_count + $3,
                 summary = $4,
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(bucket.id)
        .bind(messages.len() as i32)
        .bind(added_tokens)
        .bind(new_summary)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(AppendOutcome::Added(messages.len()))
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c == "23505")
        .unwrap_or(false)
}

fn db_err(e: sqlx::Error) -> Error {
    Error::unavailable(format!("memory store: {e}"))
}
