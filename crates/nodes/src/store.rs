use chrono::{DateTime, Utc};
use px_domain::{Error, Result};
use px_proto::rpc::NodeStatus;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Node {
    pub id: Uuid,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub status: NodeStatus,
    pub configuration: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_node(row: &sqlx::postgres::PgRow) -> Node {
    let status: String = row.get("status");
    Node {
        id: row.get("id"),
        project_id: row.get("project_id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        status: NodeStatus::parse(&status).unwrap_or(NodeStatus::Inactive),
        configuration: row.get("configuration"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const COLUMNS: &str = "id, project_id, owner_id, name, status, configuration, created_at, updated_at";

#[derive(Clone)]
pub struct NodeStore {
    pool: PgPool,
}

impl NodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id UUID PRIMARY KEY,
                project_id UUID NOT NULL,
                owner_id UUID NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                configuration JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS nodes_project ON nodes (project_id);
            CREATE INDEX IF NOT EXISTS nodes_model
                ON nodes ((configuration #>> '{model_config,model_id}'));
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn create_draft(
        &self,
        project_id: Uuid,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Node> {
        let row = sqlx::query(&format!(
            "INSERT INTO nodes (id, project_id, owner_id, name, status, configuration)
             VALUES ($1, $2, $3, $4, 'draft', '{{}}') RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(owner_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row_to_node(&row))
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Node>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM nodes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_node))
    }

    pub async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Node>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM nodes WHERE project_id = $1 ORDER BY created_at"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_node).collect())
    }

    pub async fn save(
        &self,
        id: Uuid,
        name: &str,
        configuration: &serde_json::Value,
        status: NodeStatus,
    ) -> Result<Node> {
        let row = sqlx::query(&format!(
            "UPDATE nodes
             SET name = $2, configuration = $3, status = $4, updated_at = now()
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(configuration)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row_to_node(&row))
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn delete_for_project(&self, project_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM nodes WHERE project_id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    // ── Healer queries (all run under a caller-held transaction) ────

    /// Lock and return every node pinned to `model_id`.
    pub async fn lock_nodes_for_model(
        tx: &mut Transaction<'_, Postgres>,
        model_id: Uuid,
    ) -> Result<Vec<Node>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM nodes
             WHERE configuration #>> '{{model_config,model_id}}' = $1
             FOR UPDATE"
        ))
        .bind(model_id.to_string())
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_node).collect())
    }

    /// Lock and return every node whose tool list mentions `tool_id`.
    pub async fn lock_nodes_with_tool(
        tx: &mut Transaction<'_, Postgres>,
        tool_id: Uuid,
    ) -> Result<Vec<Node>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM nodes
             WHERE configuration #> '{{tool_config,tool_ids}}' @> $1
             FOR UPDATE"
        ))
        .bind(serde_json::json!([tool_id.to_string()]))
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_node).collect())
    }

    pub async fn save_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        configuration: &serde_json::Value,
        status: NodeStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE nodes SET configuration = $2, status = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(configuration)
        .bind(status.as_str())
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::unavailable(format!("node store: {e}"))
}
