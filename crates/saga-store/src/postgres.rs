use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, Result, SagaId, SagaRun, SagaStatus, SagaStoreError,
    store::{SagaRunStore, ensure_transition},
};

const SELECT_COLUMNS: &str = "SELECT id, aggregate_id, saga_type, status, current_step, error_detail, created_at, updated_at FROM saga_runs";

/// PostgreSQL-backed saga run store.
#[derive(Clone)]
pub struct PostgresSagaRunStore {
    pool: PgPool,
}

impl PostgresSagaRunStore {
    /// Creates a new PostgreSQL saga run store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_run(row: PgRow) -> Result<SagaRun> {
        let status: String = row.try_get("status")?;
        Ok(SagaRun::restore(
            SagaId::from_uuid(row.try_get::<Uuid, _>("id")?),
            AggregateId::from(row.try_get::<String, _>("aggregate_id")?),
            row.try_get("saga_type")?,
            status.parse()?,
            row.try_get("current_step")?,
            row.try_get("error_detail")?,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }
}

#[async_trait]
impl SagaRunStore for PostgresSagaRunStore {
    async fn create(&self, aggregate_id: AggregateId, saga_type: &str) -> Result<SagaRun> {
        let run = SagaRun::new(aggregate_id, saga_type);

        sqlx::query(
            r#"
            INSERT INTO saga_runs (id, aggregate_id, saga_type, status, current_step, error_detail, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(run.id().as_uuid())
        .bind(run.aggregate_id().as_str())
        .bind(run.saga_type())
        .bind(run.status().as_str())
        .bind(run.current_step())
        .bind(run.error_detail())
        .bind(run.created_at())
        .bind(run.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(run)
    }

    async fn update(&self, run: &mut SagaRun) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let persisted: Option<String> =
            sqlx::query_scalar("SELECT status FROM saga_runs WHERE id = $1 FOR UPDATE")
                .bind(run.id().as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        let persisted: SagaStatus = persisted
            .ok_or(SagaStoreError::RunNotFound(run.id()))?
            .parse()?;
        ensure_transition(persisted, run)?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE saga_runs
            SET status = $2, current_step = $3, error_detail = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(run.id().as_uuid())
        .bind(run.status().as_str())
        .bind(run.current_step())
        .bind(run.error_detail())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        run.set_updated_at(now);
        Ok(())
    }

    async fn find_by_aggregate_id(&self, aggregate_id: &AggregateId) -> Result<Option<SagaRun>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE aggregate_id = $1 ORDER BY created_at DESC, seq DESC LIMIT 1"
        ))
        .bind(aggregate_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_run).transpose()
    }

    async fn find_all_by_aggregate_id(&self, aggregate_id: &AggregateId) -> Result<Vec<SagaRun>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE aggregate_id = $1 ORDER BY created_at ASC, seq ASC"
        ))
        .bind(aggregate_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_run).collect()
    }

    async fn find_by_id(&self, saga_id: SagaId) -> Result<Option<SagaRun>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(saga_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_run).transpose()
    }

    async fn find_by_status(&self, status: SagaStatus) -> Result<Vec<SagaRun>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE status = $1 ORDER BY created_at ASC, seq ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_run).collect()
    }
}
