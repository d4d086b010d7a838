//! PostgreSQL persistence gateway
//!
//! Every entity kind shares the `opsgate_entities` table; payloads are JSONB.
//! Batch atomicity and isolation come from native `sqlx` transactions.

use super::errors::{StoreError, StoreResult};
use super::types::EntityRecord;
use super::{PersistenceGateway, StoreTransaction};
use crate::config::DatabaseConfig;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS opsgate_entities (
    id UUID PRIMARY KEY,
    entity TEXT NOT NULL,
    data JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_INDEX_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_opsgate_entities_entity_created
    ON opsgate_entities (entity, created_at)
"#;

const RETURNING: &str = "RETURNING id, entity, data, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::InvalidData("database.url is required".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self::new(pool))
    }

    /// Create the entity table and its index if they do not exist
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in [CREATE_TABLE_SQL, CREATE_INDEX_SQL] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Migration(e.to_string()))?;
        }
        info!("Entity schema migrated");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PersistenceGateway for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn get(&self, entity: &str, id: Uuid) -> StoreResult<Option<EntityRecord>> {
        let row = sqlx::query_as::<_, EntityRecord>(
            "SELECT id, entity, data, created_at, updated_at FROM opsgate_entities \
             WHERE entity = $1 AND id = $2",
        )
        .bind(entity)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self, entity: &str) -> StoreResult<Vec<EntityRecord>> {
        let rows = sqlx::query_as::<_, EntityRecord>(
            "SELECT id, entity, data, created_at, updated_at FROM opsgate_entities \
             WHERE entity = $1 ORDER BY created_at",
        )
        .bind(entity)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_where(
        &self,
        entity: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<EntityRecord>> {
        let rows = sqlx::query_as::<_, EntityRecord>(
            "SELECT id, entity, data, created_at, updated_at FROM opsgate_entities \
             WHERE entity = $1 AND data ->> $2 = $3 ORDER BY created_at",
        )
        .bind(entity)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count(&self, entity: &str) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM opsgate_entities WHERE entity = $1")
                .bind(entity)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn create(&mut self, entity: &str, data: Value) -> StoreResult<EntityRecord> {
        let record = sqlx::query_as::<_, EntityRecord>(&format!(
            "INSERT INTO opsgate_entities (id, entity, data, created_at, updated_at) \
             VALUES ($1, $2, $3, NOW(), NOW()) {RETURNING}"
        ))
        .bind(Uuid::new_v4())
        .bind(entity)
        .bind(&data)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(record)
    }

    async fn update(&mut self, entity: &str, id: Uuid, patch: Value) -> StoreResult<EntityRecord> {
        sqlx::query_as::<_, EntityRecord>(&format!(
            "UPDATE opsgate_entities SET data = data || $3, updated_at = NOW() \
             WHERE entity = $1 AND id = $2 {RETURNING}"
        ))
        .bind(entity)
        .bind(id)
        .bind(&patch)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::not_found(entity, id))
    }

    async fn delete(&mut self, entity: &str, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM opsgate_entities WHERE entity = $1 AND id = $2")
            .bind(entity)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(entity, id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        debug!("Committed PostgreSQL transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        debug!("Rolled back PostgreSQL transaction");
        Ok(())
    }
}
