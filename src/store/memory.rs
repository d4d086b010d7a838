//! In-memory persistence gateway
//!
//! A transaction stages its writes in a private overlay. Nothing is visible
//! to readers until `commit`, which validates the whole overlay and applies
//! it under one write lock, so readers observe either the pre-commit or the
//! post-commit state. Dropping an uncommitted transaction discards the
//! overlay, which is all a rollback has to do.

use super::errors::{StoreError, StoreResult};
use super::types::EntityRecord;
use super::{PersistenceGateway, StoreTransaction};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

type Tables = HashMap<String, BTreeMap<Uuid, EntityRecord>>;

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn committed(&self, entity: &str, id: Uuid) -> Option<EntityRecord> {
        self.tables
            .read()
            .get(entity)
            .and_then(|rows| rows.get(&id))
            .cloned()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = MemoryTransaction {
            store: self.clone(),
            id: Uuid::new_v4(),
            overlay: BTreeMap::new(),
            order: Vec::new(),
        };
        debug!(transaction_id = %tx.id, "Began in-memory transaction");
        Ok(Box::new(tx))
    }

    async fn get(&self, entity: &str, id: Uuid) -> StoreResult<Option<EntityRecord>> {
        Ok(self.committed(entity, id))
    }

    async fn list(&self, entity: &str) -> StoreResult<Vec<EntityRecord>> {
        let tables = self.tables.read();
        let mut rows: Vec<EntityRecord> = tables
            .get(entity)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }

    async fn list_where(
        &self,
        entity: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<EntityRecord>> {
        let mut rows = self.list(entity).await?;
        rows.retain(|r| r.field_str(field) == Some(value));
        Ok(rows)
    }

    async fn count(&self, entity: &str) -> StoreResult<u64> {
        Ok(self
            .tables
            .read()
            .get(entity)
            .map_or(0, |rows| rows.len() as u64))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Debug)]
struct StagedWrite {
    /// `None` stages a delete
    record: Option<EntityRecord>,
    /// The row must still exist at commit (update/delete of a committed row)
    requires_existing: bool,
}

#[derive(Debug)]
struct MemoryTransaction {
    store: InMemoryStore,
    id: Uuid,
    overlay: BTreeMap<(String, Uuid), StagedWrite>,
    /// Keys in first-touch order, for logging
    order: Vec<(String, Uuid)>,
}

impl MemoryTransaction {
    /// Row as this transaction sees it: own staged writes first, then committed state
    fn visible(&self, entity: &str, id: Uuid) -> Option<EntityRecord> {
        match self.overlay.get(&(entity.to_string(), id)) {
            Some(staged) => staged.record.clone(),
            None => self.store.committed(entity, id),
        }
    }

    fn stage(&mut self, entity: &str, id: Uuid, record: Option<EntityRecord>) {
        let key = (entity.to_string(), id);
        match self.overlay.get_mut(&key) {
            Some(staged) => staged.record = record,
            None => {
                let requires_existing = self.store.committed(entity, id).is_some();
                self.order.push(key.clone());
                self.overlay.insert(
                    key,
                    StagedWrite {
                        record,
                        requires_existing,
                    },
                );
            }
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn create(&mut self, entity: &str, data: Value) -> StoreResult<EntityRecord> {
        let record = EntityRecord::new(entity, data);
        self.stage(entity, record.id, Some(record.clone()));
        Ok(record)
    }

    async fn update(&mut self, entity: &str, id: Uuid, patch: Value) -> StoreResult<EntityRecord> {
        let mut record = self
            .visible(entity, id)
            .ok_or_else(|| StoreError::not_found(entity, id))?;
        record.apply_patch(patch);
        self.stage(entity, id, Some(record.clone()));
        Ok(record)
    }

    async fn delete(&mut self, entity: &str, id: Uuid) -> StoreResult<()> {
        if self.visible(entity, id).is_none() {
            return Err(StoreError::not_found(entity, id));
        }
        self.stage(entity, id, None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            store, id, overlay, ..
        } = *self;
        let mut tables = store.tables.write();

        for ((entity, row_id), staged) in &overlay {
            let exists = tables
                .get(entity)
                .is_some_and(|rows| rows.contains_key(row_id));
            if staged.requires_existing && !exists {
                return Err(StoreError::Conflict {
                    entity: entity.clone(),
                    id: *row_id,
                    reason: "row was removed by a concurrent transaction".to_string(),
                });
            }
        }

        let writes = overlay.len();
        for ((entity, row_id), staged) in overlay {
            let rows = tables.entry(entity).or_default();
            match staged.record {
                Some(record) => {
                    rows.insert(row_id, record);
                }
                None => {
                    rows.remove(&row_id);
                }
            }
        }

        debug!(transaction_id = %id, writes, "Committed in-memory transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        debug!(
            transaction_id = %self.id,
            discarded_writes = self.order.len(),
            "Rolled back in-memory transaction"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create("user", json!({"name": "A"})).await.unwrap();

        assert_eq!(store.count("user").await.unwrap(), 0);
        tx.commit().await.unwrap();
        assert_eq!(store.count("user").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_everything() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create("user", json!({"name": "A"})).await.unwrap();
        tx.create("order", json!({"total": 3})).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.count("user").await.unwrap(), 0);
        assert_eq!(store.count("order").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_rolled_back() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.create("user", json!({"name": "A"})).await.unwrap();
        }
        assert_eq!(store.count("user").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_and_delete_within_transaction() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let created = tx.create("product", json!({"name": "Widget"})).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let updated = tx
            .update("product", created.id, json!({"price": 10}))
            .await
            .unwrap();
        assert_eq!(updated.data, json!({"name": "Widget", "price": 10}));
        // committed state untouched until commit
        assert_eq!(
            store.get("product", created.id).await.unwrap().unwrap().data,
            json!({"name": "Widget"})
        );
        tx.delete("product", created.id).await.unwrap();
        assert!(matches!(
            tx.update("product", created.id, json!({})).await,
            Err(StoreError::NotFound { .. })
        ));
        tx.commit().await.unwrap();

        assert!(store.get("product", created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_row_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = tx.delete("user", Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_commit_detects_concurrent_delete() {
        let store = InMemoryStore::new();
        let mut setup = store.begin().await.unwrap();
        let row = setup.create("user", json!({"name": "A"})).await.unwrap();
        setup.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        first.update("user", row.id, json!({"name": "B"})).await.unwrap();

        let mut second = store.begin().await.unwrap();
        second.delete("user", row.id).await.unwrap();
        second.commit().await.unwrap();

        assert!(matches!(
            first.commit().await,
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(store.count("user").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_where_filters_on_payload_field() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create("operation", json!({"owner_id": "u-1"})).await.unwrap();
        tx.create("operation", json!({"owner_id": "u-2"})).await.unwrap();
        tx.create("operation", json!({"owner_id": "u-1"})).await.unwrap();
        tx.commit().await.unwrap();

        let mine = store.list_where("operation", "owner_id", "u-1").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(store.list("operation").await.unwrap().len(), 3);
    }
}
