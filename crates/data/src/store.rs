use chrono::{DateTime, Utc};
use px_domain::{Error, Result};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub project_id: Uuid,
    pub filename: String,
    pub mimetype: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

fn row_to_file(row: &sqlx::postgres::PgRow) -> StoredFile {
    StoredFile {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        project_id: row.get("project_id"),
        filename: row.get("filename"),
        mimetype: row.get("mimetype"),
        size_bytes: row.get("size_bytes"),
        storage_path: row.get("storage_path"),
        created_at: row.get("created_at"),
    }
}

const COLUMNS: &str = "id, owner_id, project_id, filename, mimetype, size_bytes, storage_path, created_at";

#[derive(Clone)]
pub struct FileStore {
    pool: PgPool,
}

impl FileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS stored_files (
                id UUID PRIMARY KEY,
                owner_id UUID NOT NULL,
                project_id UUID NOT NULL,
                filename TEXT NOT NULL,
                mimetype TEXT NOT NULL,
                size_bytes BIGINT NOT NULL,
                storage_path TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS stored_files_owner ON stored_files (owner_id);
            CREATE INDEX IF NOT EXISTS stored_files_project ON stored_files (project_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
        filename: &str,
        mimetype: &str,
        size_bytes: i64,
        storage_path: &str,
    ) -> Result<StoredFile> {
        let row = sqlx::query(&format!(
            "INSERT INTO stored_files (id, owner_id, project_id, filename, mimetype, size_bytes, storage_path)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(project_id)
        .bind(filename)
        .bind(mimetype)
        .bind(size_bytes)
        .bind(storage_path)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row_to_file(&row))
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<StoredFile>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM stored_files WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_file))
    }

    pub async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<StoredFile>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM stored_files WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_file).collect())
    }

    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<StoredFile>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM stored_files WHERE owner_id = $1 ORDER BY created_at"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_file).collect())
    }

    pub async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<StoredFile>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM stored_files WHERE project_id = $1"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_file).collect())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM stored_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::unavailable(format!("file store: {e}"))
}
