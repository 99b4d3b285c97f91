use px_domain::{Error, Result};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{Saga, SagaStatus, SagaType, StepOutcome};

/// Persistence for sagas and their steps. Shared by the services that
/// originate deletions (Accounts, Projects) and their finalizer workers.
#[derive(Clone)]
pub struct SagaStore {
    pool: PgPool,
}

impl SagaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS sagas (
                id UUID PRIMARY KEY,
                saga_type TEXT NOT NULL,
                related_resource_id UUID NOT NULL,
                status TEXT NOT NULL DEFAULT 'in_progress',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE UNIQUE INDEX IF NOT EXISTS sagas_one_running
                ON sagas (saga_type, related_resource_id)
                WHERE status = 'in_progress';
            CREATE TABLE IF NOT EXISTS saga_steps (
                id UUID PRIMARY KEY,
                saga_id UUID NOT NULL REFERENCES sagas(id) ON DELETE CASCADE,
                service_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (saga_id, service_name)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// True when an IN_PROGRESS saga exists for the resource.
    pub async fn is_running(&self, saga_type: SagaType, resource_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS one FROM sagas
             WHERE saga_type = $1 AND related_resource_id = $2 AND status = 'in_progress'",
        )
        .bind(saga_type.as_str())
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.is_some())
    }

    /// Create a saga and its PENDING steps inside the caller's
    /// transaction. The caller performs its soft-state change and the
    /// initiation publish in the same transaction; a publish failure
    /// rolls everything back.
    ///
    /// Returns `Conflict` if an IN_PROGRESS saga already exists.
    pub async fn begin_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        saga_type: SagaType,
        resource_id: Uuid,
        services: &[String],
    ) -> Result<Saga> {
        let existing = sqlx::query(
            "SELECT 1 AS one FROM sagas
             WHERE saga_type = $1 AND related_resource_id = $2 AND status = 'in_progress'
             FOR UPDATE",
        )
        .bind(saga_type.as_str())
        .bind(resource_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;
        if existing.is_some() {
            return Err(Error::conflict(format!(
                "a {} saga is already in progress for {resource_id}",
                saga_type.as_str()
            )));
        }

        let saga_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO sagas (id, saga_type, related_resource_id, status)
             VALUES ($1, $2, $3, 'in_progress')",
        )
        .bind(saga_id)
        .bind(saga_type.as_str())
        .bind(resource_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            // Lost a race with a concurrent initiation: the partial
            // unique index on IN_PROGRESS sagas rejects the insert.
            if e.as_database_error()
                .and_then(|d| d.code())
                .map(|c| c == "23505")
                .unwrap_or(false)
            {
                Error::conflict(format!(
                    "a {} saga is already in progress for {resource_id}",
                    saga_type.as_str()
                ))
            } else {
                db_err(e)
            }
        })?;

        for service in services {
            sqlx::query(
                "INSERT INTO saga_steps (id, saga_id, service_name, status)
                 VALUES ($1, $2, $3, 'pending')",
            )
            .bind(Uuid::new_v4())
            .bind(saga_id)
            .bind(service)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }

        Ok(Saga {
            id: saga_id,
            saga_type,
            related_resource_id: resource_id,
            status: SagaStatus::InProgress,
        })
    }

    /// Apply one service confirmation inside the caller's transaction.
    ///
    /// Locks the saga row, flips the step idempotently, and reports
    /// whether the saga is now complete. On `SagaComplete` the caller
    /// runs the hard delete on the same transaction before committing.
    pub async fn confirm_step_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        saga_type: SagaType,
        resource_id: Uuid,
        service_name: &str,
    ) -> Result<StepOutcome> {
        let saga_row = sqlx::query(
            "SELECT id FROM sagas
             WHERE saga_type = $1 AND related_resource_id = $2 AND status = 'in_progress'
             FOR UPDATE",
        )
        .bind(saga_type.as_str())
        .bind(resource_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

        let saga_id: Uuid = match saga_row {
            Some(row) => row.get("id"),
            None => return Ok(StepOutcome::UnknownSaga),
        };

        let step = sqlx::query(
            "SELECT status FROM saga_steps
             WHERE saga_id = $1 AND service_name = $2
             FOR UPDATE",
        )
        .bind(saga_id)
        .bind(service_name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

        match step {
            Some(row) => {
                let status: String = row.get("status");
                if status == "completed" {
                    return Ok(StepOutcome::AlreadyComplete);
                }
                sqlx::query(
                    "UPDATE saga_steps SET status = 'completed', updated_at = now()
                     WHERE saga_id = $1 AND service_name = $2",
                )
                .bind(saga_id)
                .bind(service_name)
                .execute(&mut **tx)
                .await
                .map_err(db_err)?;
            }
            None => {
                // Confirmation from a service the saga did not
                // pre-register; record it so the ledger is complete.
                sqlx::query(
                    "INSERT INTO saga_steps (id, saga_id, service_name, status)
                     VALUES ($1, $2, $3, 'completed')",
                )
                .bind(Uuid::new_v4())
                .bind(saga_id)
                .bind(service_name)
                .execute(&mut **tx)
                .await
                .map_err(db_err)?;
            }
        }

        let pending: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM saga_steps WHERE saga_id = $1 AND status = 'pending'",
        )
        .bind(saga_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_err)?
        .get("n");

        if pending > 0 {
            return Ok(StepOutcome::StepRecorded);
        }

        sqlx::query("UPDATE sagas SET status = 'completed', updated_at = now() WHERE id = $1")
            .bind(saga_id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        Ok(StepOutcome::SagaComplete)
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::unavailable(format!("saga store: {e}"))
}
