use chrono::{DateTime, Utc};
use px_domain::{Error, Result};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    Active,
    PendingDeletion,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::PendingDeletion => "pending_deletion",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending_deletion" => ProjectStatus::PendingDeletion,
            _ => ProjectStatus::Active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub status: ProjectStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_project(row: &sqlx::postgres::PgRow) -> Project {
    let status: String = row.get("status");
    Project {
        id: row.get("id"),
        name: row.get("name"),
        owner_id: row.get("owner_id"),
        status: ProjectStatus::parse(&status),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const COLUMNS: &str = "id, name, owner_id, status, metadata, created_at, updated_at";

#[derive(Clone)]
pub struct ProjectStore {
    pool: PgPool,
}

impl ProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                owner_id UUID NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS projects_owner ON projects (owner_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn create(
        &self,
        name: &str,
        owner_id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<Project> {
        let row = sqlx::query(&format!(
            "INSERT INTO projects (id, name, owner_id, metadata)
             VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(owner_id)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row_to_project(&row))
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Project>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM projects WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_project))
    }

    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<Project>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM projects WHERE owner_id = $1 ORDER BY created_at"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_project).collect())
    }

    pub async fn list_active_for_owner(&self, owner_id: Uuid) -> Result<Vec<Project>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM projects WHERE owner_id = $1 AND status = 'active'"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_project).collect())
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: &str,
        metadata: serde_json::Value,
    ) -> Result<Project> {
        let row = sqlx::query(&format!(
            "UPDATE projects SET name = $2, metadata = $3, updated_at = now()
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row_to_project(&row))
    }

    /// Flip to PENDING_DELETION inside the saga-initiation transaction.
    pub async fn mark_pending_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE projects SET status = 'pending_deletion', updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Hard delete inside the finalizer transaction.
    pub async fn delete_in_tx(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::unavailable(format!("project store: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        assert_eq!(
            ProjectStatus::parse(ProjectStatus::Active.as_str()),
            ProjectStatus::Active
        );
        assert_eq!(
            ProjectStatus::parse(ProjectStatus::PendingDeletion.as_str()),
            ProjectStatus::PendingDeletion
        );
    }

    #[test]
    fn unknown_status_defaults_to_active() {
        assert_eq!(ProjectStatus::parse("archived"), ProjectStatus::Active);
    }
}
