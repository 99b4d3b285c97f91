use chrono::{DateTime, Utc};
use px_domain::{Error, Principal, Result};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// An AI model registration. `is_system_model ⟺ owner_id IS NULL`;
/// system models are readable by everyone and writable only by staff.
#[derive(Debug, Clone)]
pub struct AiModel {
    pub id: Uuid,
    pub is_system_model: bool,
    pub owner_id: Option<Uuid>,
    pub provider: String,
    pub name: String,
    pub configuration: serde_json::Value,
    pub capabilities: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AiModel {
    /// Visibility: owners see their models, everyone sees system models.
    pub fn visible_to(&self, principal: Principal) -> bool {
        self.is_system_model || self.owner_id == Some(principal.id) || principal.is_staff
    }

    /// Mutability: staff for system models, the owner otherwise.
    pub fn writable_by(&self, principal: Principal) -> bool {
        if self.is_system_model {
            principal.is_staff
        } else {
            self.owner_id == Some(principal.id) || principal.is_staff
        }
    }
}

fn row_to_model(row: &sqlx::postgres::PgRow) -> AiModel {
    let capabilities: serde_json::Value = row.get("capabilities");
    let capabilities = capabilities
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    let owner_id: Option<Uuid> = row.get("owner_id");
    AiModel {
        id: row.get("id"),
        is_system_model: owner_id.is_none(),
        owner_id,
        provider: row.get("provider"),
        name: row.get("name"),
        configuration: row.get("configuration"),
        capabilities,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const COLUMNS: &str = "id, owner_id, provider, name, configuration, capabilities, created_at, updated_at";

#[derive(Clone)]
pub struct ModelStore {
    pool: PgPool,
}

impl ModelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS ai_models (
                id UUID PRIMARY KEY,
                owner_id UUID,
                provider TEXT NOT NULL,
                name TEXT NOT NULL,
                configuration JSONB NOT NULL DEFAULT '{}',
                capabilities JSONB NOT NULL DEFAULT '[]',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS ai_models_owner ON ai_models (owner_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn create(
        &self,
        owner_id: Option<Uuid>,
        provider: &str,
        name: &str,
        configuration: serde_json::Value,
        capabilities: &[String],
    ) -> Result<AiModel> {
        let row = sqlx::query(&format!(
            "INSERT INTO ai_models (id, owner_id, provider, name, configuration, capabilities)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(provider)
        .bind(name)
        .bind(configuration)
        .bind(serde_json::json!(capabilities))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row_to_model(&row))
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<AiModel>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM ai_models WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_model))
    }

    /// The caller's models plus the system catalogue.
    pub async fn list_visible(&self, principal: Principal) -> Result<Vec<AiModel>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ai_models
             WHERE owner_id IS NULL OR owner_id = $1
             ORDER BY created_at"
        ))
        .bind(principal.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_model).collect())
    }

    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<AiModel>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ai_models WHERE owner_id = $1"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_model).collect())
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: &str,
        configuration: serde_json::Value,
        capabilities: &[String],
    ) -> Result<AiModel> {
        let row = sqlx::query(&format!(
            "UPDATE ai_models
             SET name = $2, configuration = $3, capabilities = $4, updated_at = now()
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(configuration)
        .bind(serde_json::json!(capabilities))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row_to_model(&row))
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM ai_models WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::unavailable(format!("model store: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(owner: Option<Uuid>) -> AiModel {
        AiModel {
            id: Uuid::new_v4(),
            is_system_model: owner.is_none(),
            owner_id: owner,
            provider: "openai".into(),
            name: "gpt-4o".into(),
            configuration: serde_json::json!({}),
            capabilities: vec!["text".into()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn system_models_visible_to_all_writable_by_staff() {
        let m = model(None);
        let user = Principal::user(Uuid::new_v4());
        let staff = Principal::staff(Uuid::new_v4());
        assert!(m.visible_to(user));
        assert!(!m.writable_by(user));
        assert!(m.writable_by(staff));
    }

    #[test]
    fn owned_models_private_to_owner() {
        let owner = Uuid::new_v4();
        let m = model(Some(owner));
        assert!(m.visible_to(Principal::user(owner)));
        assert!(m.writable_by(Principal::user(owner)));
        assert!(!m.visible_to(Principal::user(Uuid::new_v4())));
    }
}
