use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{SagaRecord, SagaStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Parse(String),
}

/// Durable saga bookkeeping. The coordinator is the only writer of a given id.
#[async_trait]
pub trait SagaStore: Send + Sync {
    async fn create(&self, saga_id: Uuid, status: SagaStatus) -> Result<SagaRecord, StoreError>;

    /// Moves a `started` saga to a terminal status. Terminal records never change.
    async fn update(&self, saga_id: Uuid, status: SagaStatus) -> Result<SagaRecord, StoreError>;

    async fn get(&self, saga_id: Uuid) -> Result<SagaRecord, StoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSagaStore {
    pool: SqlitePool,
}

impl SqliteSagaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SagaStore for SqliteSagaStore {
    async fn create(&self, saga_id: Uuid, status: SagaStatus) -> Result<SagaRecord, StoreError> {
        let now_str = format_utc(Utc::now());

        let row = sqlx::query_as::<_, SagaRow>(
            r#"
            INSERT INTO sagas (saga_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING saga_id, status, created_at, updated_at
            "#,
        )
        .bind(saga_id.to_string())
        .bind(status_to_str(status))
        .bind(&now_str)
        .bind(&now_str)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn update(&self, saga_id: Uuid, status: SagaStatus) -> Result<SagaRecord, StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::Conflict(
                "saga status can only move to a terminal state".to_string(),
            ));
        }
        let now_str = format_utc(Utc::now());
        let id = saga_id.to_string();

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, SagaRow>(
            r#"
            UPDATE sagas
            SET status = ?,
                updated_at = ?
            WHERE saga_id = ?
              AND status = 'started'
            RETURNING saga_id, status, created_at, updated_at
            "#,
        )
        .bind(status_to_str(status))
        .bind(&now_str)
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM sagas WHERE saga_id = ?")
                    .bind(&id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Err(match current {
                Some(current) => StoreError::Conflict(format!("saga already {current}")),
                None => StoreError::NotFound("saga not found".to_string()),
            });
        };

        tx.commit().await?;
        row.try_into()
    }

    async fn get(&self, saga_id: Uuid) -> Result<SagaRecord, StoreError> {
        let row = sqlx::query_as::<_, SagaRow>(
            r#"
            SELECT saga_id, status, created_at, updated_at
            FROM sagas
            WHERE saga_id = ?
            "#,
        )
        .bind(saga_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("saga not found".to_string()))?;

        row.try_into()
    }
}

#[derive(sqlx::FromRow)]
struct SagaRow {
    saga_id: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SagaRow> for SagaRecord {
    type Error = StoreError;

    fn try_from(row: SagaRow) -> Result<Self, Self::Error> {
        Ok(SagaRecord {
            saga_id: Uuid::parse_str(&row.saga_id)
                .map_err(|err| StoreError::Parse(format!("invalid saga id: {err}")))?,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_status(status: &str) -> Result<SagaStatus, StoreError> {
    match status {
        "started" => Ok(SagaStatus::Started),
        "completed" => Ok(SagaStatus::Completed),
        "failed" => Ok(SagaStatus::Failed),
        other => Err(StoreError::Parse(format!("unknown saga status: {other}"))),
    }
}

fn status_to_str(status: SagaStatus) -> &'static str {
    match status {
        SagaStatus::Started => "started",
        SagaStatus::Completed => "completed",
        SagaStatus::Failed => "failed",
    }
}

fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
