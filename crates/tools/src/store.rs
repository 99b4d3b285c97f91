use chrono::{DateTime, Utc};
use px_domain::{Error, Principal, Result};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolType {
    Standard,
    Mcp,
}

impl ToolType {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolType::Standard => "standard",
            ToolType::Mcp => "mcp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(ToolType::Standard),
            "mcp" => Some(ToolType::Mcp),
            _ => None,
        }
    }
}

/// A registered tool. `definition` carries the complete JSON definition:
/// `{name, description, parameters, execution: {type, …}}`.
#[derive(Debug, Clone)]
pub struct Tool {
    pub id: Uuid,
    pub name: String,
    pub is_system_tool: bool,
    pub owner_id: Option<Uuid>,
    pub tool_type: ToolType,
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    pub fn visible_to(&self, principal: Principal) -> bool {
        self.is_system_tool || self.owner_id == Some(principal.id) || principal.is_staff
    }

    pub fn writable_by(&self, principal: Principal) -> bool {
        if self.is_system_tool {
            principal.is_staff
        } else {
            self.owner_id == Some(principal.id) || principal.is_staff
        }
    }

    pub fn description(&self) -> &str {
        self.definition
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    pub fn parameters(&self) -> serde_json::Value {
        self.definition
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}))
    }

    pub fn execution(&self) -> serde_json::Value {
        self.definition
            .get("execution")
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }
}

fn row_to_tool(row: &sqlx::postgres::PgRow) -> Tool {
    let owner_id: Option<Uuid> = row.get("owner_id");
    let tool_type: String = row.get("tool_type");
    Tool {
        id: row.get("id"),
        name: row.get("name"),
        is_system_tool: owner_id.is_none(),
        owner_id,
        tool_type: ToolType::parse(&tool_type).unwrap_or(ToolType::Standard),
        definition: row.get("definition"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const COLUMNS: &str = "id, name, owner_id, tool_type, definition, created_at, updated_at";

#[derive(Clone)]
pub struct ToolStore {
    pool: PgPool,
}

impl ToolStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS tools (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                owner_id UUID,
                tool_type TEXT NOT NULL DEFAULT 'standard',
                definition JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE UNIQUE INDEX IF NOT EXISTS tools_owner_name
                ON tools ((COALESCE(owner_id, '00000000-0000-0000-0000-000000000000'::uuid)), name);
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
        owner_id: Option<Uuid>,
        tool_type: ToolType,
        definition: serde_json::Value,
    ) -> Result<Tool> {
        let row = sqlx::query(&format!(
            "INSERT INTO tools (id, name, owner_id, tool_type, definition)
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(owner_id)
        .bind(tool_type.as_str())
        .bind(definition)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::invalid_argument(format!("a tool named '{name}' already exists"))
            } else {
                db_err(e)
            }
        })?;
        Ok(row_to_tool(&row))
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Tool>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM tools WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_tool))
    }

    pub async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Tool>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM tools WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_tool).collect())
    }

    /// Resolve an execution target by name. System tools win over
    /// user-owned homonyms; authorization happened when the definitions
    /// were fetched for the job.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Tool>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM tools WHERE name = $1
             ORDER BY (owner_id IS NULL) DESC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_tool))
    }

    pub async fn list_visible(&self, principal: Principal) -> Result<Vec<Tool>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM tools
             WHERE owner_id IS NULL OR owner_id = $1
             ORDER BY (owner_id IS NULL) DESC, name"
        ))
        .bind(principal.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_tool).collect())
    }

    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<Tool>> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM tools WHERE owner_id = $1"))
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(row_to_tool).collect())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM tools WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c == "23505")
        .unwrap_or(false)
}

fn db_err(e: sqlx::Error) -> Error {
    Error::unavailable(format!("tool store: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(owner: Option<Uuid>, execution: serde_json::Value) -> Tool {
        Tool {
            id: Uuid::new_v4(),
            name: "get_current_weather".into(),
            is_system_tool: owner.is_none(),
            owner_id: owner,
            tool_type: ToolType::Standard,
            definition: serde_json::json!({
                "description": "Current weather for a city",
                "parameters": {"type": "object", "properties": {"location": {"type": "string"}}},
                "execution": execution,
            }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn definition_accessors() {
        let t = tool(None, serde_json::json!({"type": "internal_function"}));
        assert_eq!(t.description(), "Current weather for a city");
        assert_eq!(t.execution()["type"], "internal_function");
        assert!(t.parameters()["properties"]["location"].is_object());
    }

    #[test]
    fn missing_parameters_default_to_empty_schema() {
        let mut t = tool(None, serde_json::Value::Null);
        t.definition = serde_json::json!({"description": "x"});
        assert_eq!(t.parameters()["type"], "object");
    }

    #[test]
    fn system_tool_permissions() {
        let t = tool(None, serde_json::Value::Null);
        let user = Principal::user(Uuid::new_v4());
        assert!(t.visible_to(user));
        assert!(!t.writable_by(user));
        assert!(t.writable_by(Principal::staff(Uuid::new_v4())));
    }
}
