//! # Persistence Gateway
//!
//! Transactional entity storage behind two object-safe traits:
//!
//! - [`PersistenceGateway`] opens transactions and serves committed reads
//! - [`StoreTransaction`] stages creates, updates and deletes, then commits
//!   or rolls back as a unit
//!
//! Backends: [`InMemoryStore`] (default) and [`PgStore`].

pub mod errors;
pub mod memory;
pub mod postgres;
pub mod types;

pub use errors::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use types::EntityRecord;

use crate::config::{DatabaseBackend, DatabaseConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait PersistenceGateway: Send + Sync + std::fmt::Debug {
    /// Open a transaction. Its writes are invisible to every reader until commit.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    async fn get(&self, entity: &str, id: Uuid) -> StoreResult<Option<EntityRecord>>;

    /// Committed rows of one entity kind, oldest first
    async fn list(&self, entity: &str) -> StoreResult<Vec<EntityRecord>>;

    /// Committed rows whose payload has `field` equal to the string `value`
    async fn list_where(
        &self,
        entity: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<EntityRecord>>;

    async fn count(&self, entity: &str) -> StoreResult<u64>;

    async fn ping(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// An open transaction. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn create(&mut self, entity: &str, data: Value) -> StoreResult<EntityRecord>;

    /// Shallow-merge `patch` into an existing row
    async fn update(&mut self, entity: &str, id: Uuid, patch: Value) -> StoreResult<EntityRecord>;

    async fn delete(&mut self, entity: &str, id: Uuid) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Build the configured backend, running migrations for postgres when enabled
pub async fn create_gateway(config: &DatabaseConfig) -> StoreResult<Arc<dyn PersistenceGateway>> {
    match config.backend {
        DatabaseBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        DatabaseBackend::Postgres => {
            let store = PgStore::connect(config).await?;
            if config.run_migrations {
                store.migrate().await?;
            }
            Ok(Arc::new(store))
        }
    }
}
