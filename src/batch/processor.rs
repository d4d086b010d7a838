//! # Batch Transaction Processor
//!
//! Applies an ordered list of entity operations inside one store
//! transaction. The first failing operation aborts the batch: the
//! transaction is rolled back and the caller sees `operations_completed = 0`.
//! The number of operations applied before the failure is only logged.

use super::registry::EntityRegistry;
use super::types::{BatchOperation, BatchResult, OperationType};
use crate::logging::log_batch_transaction;
use crate::metrics::ApiMetrics;
use crate::store::{PersistenceGateway, StoreError, StoreTransaction};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch must contain at least one operation")]
    Empty,

    #[error("batch contains {count} operations, the maximum is {max}")]
    TooLarge { count: usize, max: usize },

    #[error("operation {index}: unknown entity type '{entity}'")]
    UnknownEntity { index: usize, entity: String },

    #[error("operation {index}: {reason}")]
    InvalidOperation { index: usize, reason: String },

    #[error("operation {index} ({operation} {entity}) failed: {source}")]
    Store {
        index: usize,
        operation: &'static str,
        entity: String,
        #[source]
        source: StoreError,
    },

    #[error("could not open transaction: {0}")]
    Begin(#[source] StoreError),

    #[error("commit failed: {0}")]
    Commit(#[source] StoreError),

    #[error("batch execution aborted unexpectedly")]
    Aborted,
}

impl BatchError {
    /// Request-shape problems detected before any transaction is opened
    pub fn is_validation(&self) -> bool {
        matches!(self, BatchError::Empty | BatchError::TooLarge { .. })
    }

    /// Message safe for API clients; storage internals are withheld
    pub fn client_message(&self) -> String {
        match self {
            BatchError::Store {
                index,
                operation,
                entity,
                source,
            } => format!(
                "operation {index} ({operation} {entity}) failed: {}",
                source.client_message()
            ),
            BatchError::Begin(source) | BatchError::Commit(source) => format!(
                "transaction could not be completed: {}",
                source.client_message()
            ),
            other => other.to_string(),
        }
    }
}

pub struct BatchProcessor {
    store: Arc<dyn PersistenceGateway>,
    registry: EntityRegistry,
    max_operations: usize,
    metrics: Option<ApiMetrics>,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("backend", &self.store.backend_name())
            .field("registry", &self.registry)
            .field("max_operations", &self.max_operations)
            .finish()
    }
}

impl BatchProcessor {
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        registry: EntityRegistry,
        max_operations: usize,
    ) -> Self {
        Self {
            store,
            registry,
            max_operations,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ApiMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Size checks; a batch that fails these never opens a transaction
    pub fn validate(&self, operations: &[BatchOperation]) -> Result<(), BatchError> {
        if operations.is_empty() {
            return Err(BatchError::Empty);
        }
        if operations.len() > self.max_operations {
            return Err(BatchError::TooLarge {
                count: operations.len(),
                max: self.max_operations,
            });
        }
        Ok(())
    }

    /// Run the batch on its own task so a dropped request cannot interrupt
    /// commit or rollback half way.
    pub async fn execute_detached(self: &Arc<Self>, operations: Vec<BatchOperation>) -> BatchResult {
        let processor = Arc::clone(self);
        match tokio::spawn(async move { processor.execute(&operations).await }).await {
            Ok(result) => result,
            Err(join_error) => {
                error!(error = %join_error, "Batch task aborted");
                BatchResult::failed(BatchError::Aborted.to_string())
            }
        }
    }

    /// Apply all operations atomically
    pub async fn execute(&self, operations: &[BatchOperation]) -> BatchResult {
        let batch_id = Uuid::new_v4();

        if let Err(e) = self.validate(operations) {
            log_batch_transaction(&batch_id, false, operations.len(), 0, Some(&e.to_string()));
            self.record(false, 0);
            return BatchResult::failed(e.client_message());
        }

        match self.run(batch_id, operations).await {
            Ok(applied) => {
                log_batch_transaction(&batch_id, true, operations.len(), applied, None);
                self.record(true, applied);
                BatchResult::committed(applied)
            }
            Err((applied_before_failure, e)) => {
                log_batch_transaction(
                    &batch_id,
                    false,
                    operations.len(),
                    applied_before_failure,
                    Some(&e.to_string()),
                );
                self.record(false, 0);
                BatchResult::failed(e.client_message())
            }
        }
    }

    /// Returns the applied count, or the count applied before the failure
    async fn run(
        &self,
        batch_id: Uuid,
        operations: &[BatchOperation],
    ) -> Result<usize, (usize, BatchError)> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| (0, BatchError::Begin(e)))?;

        for (index, operation) in operations.iter().enumerate() {
            if let Err(e) = self.apply(tx.as_mut(), index, operation).await {
                self.rollback(batch_id, tx).await;
                return Err((index, e));
            }
            debug!(
                batch_id = %batch_id,
                index,
                operation = operation.operation_type.as_str(),
                entity = %operation.entity,
                "Operation applied"
            );
        }

        tx.commit()
            .await
            .map_err(|e| (operations.len(), BatchError::Commit(e)))?;
        Ok(operations.len())
    }

    async fn apply(
        &self,
        tx: &mut dyn StoreTransaction,
        index: usize,
        operation: &BatchOperation,
    ) -> Result<(), BatchError> {
        let entity = operation.entity.as_str();
        if !self.registry.contains(entity) {
            return Err(BatchError::UnknownEntity {
                index,
                entity: entity.to_string(),
            });
        }

        let mut data = match &operation.data {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => {
                return Err(BatchError::InvalidOperation {
                    index,
                    reason: "data must be an object".to_string(),
                })
            }
        };
        let target = data.remove("id");

        let store_error = |source: StoreError| BatchError::Store {
            index,
            operation: operation.operation_type.as_str(),
            entity: entity.to_string(),
            source,
        };

        match operation.operation_type {
            OperationType::Create => {
                tx.create(entity, Value::Object(data))
                    .await
                    .map_err(store_error)?;
            }
            OperationType::Update => {
                let id = target_id(index, target)?;
                tx.update(entity, id, Value::Object(data))
                    .await
                    .map_err(store_error)?;
            }
            OperationType::Delete => {
                let id = target_id(index, target)?;
                tx.delete(entity, id).await.map_err(store_error)?;
            }
        }
        Ok(())
    }

    async fn rollback(&self, batch_id: Uuid, tx: Box<dyn StoreTransaction>) {
        if let Err(e) = tx.rollback().await {
            // the failure is still reported to the caller as a failed batch
            error!(batch_id = %batch_id, error = %e, "Batch rollback failed");
        }
    }

    fn record(&self, committed: bool, applied: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.record_batch(committed, applied);
        }
    }
}

fn target_id(index: usize, target: Option<Value>) -> Result<Uuid, BatchError> {
    let raw = target.ok_or_else(|| BatchError::InvalidOperation {
        index,
        reason: "data.id is required for update and delete".to_string(),
    })?;
    raw.as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| BatchError::InvalidOperation {
            index,
            reason: "data.id must be a UUID string".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityRecord, InMemoryStore, StoreResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn processor(store: Arc<dyn PersistenceGateway>) -> BatchProcessor {
        BatchProcessor::new(
            store,
            EntityRegistry::new(["user", "product", "order"]),
            10,
        )
    }

    fn op(operation_type: OperationType, entity: &str, data: Value) -> BatchOperation {
        BatchOperation {
            operation_type,
            entity: entity.to_string(),
            data,
        }
    }

    #[tokio::test]
    async fn test_all_operations_commit() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(store.clone());

        let result = processor
            .execute(&[
                op(OperationType::Create, "user", json!({"name": "Test User"})),
                op(OperationType::Create, "product", json!({"name": "Widget"})),
                op(OperationType::Create, "order", json!({"total": 5})),
            ])
            .await;

        assert_eq!(result, BatchResult::committed(3));
        assert_eq!(store.count("user").await.unwrap(), 1);
        assert_eq!(store.count("product").await.unwrap(), 1);
        assert_eq!(store.count("order").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_entity_rolls_back_prior_operations() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(store.clone());

        let result = processor
            .execute(&[
                op(OperationType::Create, "user", json!({"name": "Test User"})),
                op(OperationType::Create, "invalid", json!({"invalid": true})),
            ])
            .await;

        assert!(!result.success);
        assert_eq!(result.operations_completed, 0);
        assert!(result.error.unwrap().contains("unknown entity type 'invalid'"));
        assert_eq!(store.count("user").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_of_missing_row_fails_batch() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(store.clone());

        let result = processor
            .execute(&[
                op(OperationType::Create, "user", json!({"name": "A"})),
                op(
                    OperationType::Update,
                    "user",
                    json!({"id": Uuid::new_v4().to_string(), "name": "B"}),
                ),
            ])
            .await;

        assert!(!result.success);
        assert_eq!(result.operations_completed, 0);
        assert_eq!(store.count("user").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_and_delete_existing_rows() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(store.clone());
        processor
            .execute(&[
                op(OperationType::Create, "product", json!({"name": "A"})),
                op(OperationType::Create, "product", json!({"name": "B"})),
            ])
            .await;
        let rows = store.list("product").await.unwrap();

        let result = processor
            .execute(&[
                op(
                    OperationType::Update,
                    "product",
                    json!({"id": rows[0].id.to_string(), "price": 3}),
                ),
                op(
                    OperationType::Delete,
                    "product",
                    json!({"id": rows[1].id.to_string()}),
                ),
            ])
            .await;

        assert_eq!(result, BatchResult::committed(2));
        let remaining = store.list("product").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].data, json!({"name": "A", "price": 3}));
    }

    #[tokio::test]
    async fn test_operation_shape_errors() {
        let processor = processor(Arc::new(InMemoryStore::new()));

        let missing_id = processor
            .execute(&[op(OperationType::Delete, "user", json!({}))])
            .await;
        assert!(missing_id.error.unwrap().contains("data.id is required"));

        let bad_id = processor
            .execute(&[op(OperationType::Delete, "user", json!({"id": "nope"}))])
            .await;
        assert!(bad_id.error.unwrap().contains("must be a UUID"));

        let scalar = processor
            .execute(&[op(OperationType::Create, "user", json!(42))])
            .await;
        assert!(scalar.error.unwrap().contains("must be an object"));
    }

    #[tokio::test]
    async fn test_size_validation() {
        let processor = processor(Arc::new(InMemoryStore::new()));
        assert!(matches!(processor.validate(&[]), Err(BatchError::Empty)));

        let too_many: Vec<_> = (0..11)
            .map(|_| op(OperationType::Create, "user", json!({})))
            .collect();
        let err = processor.validate(&too_many).unwrap_err();
        assert!(err.is_validation());
        assert!(matches!(err, BatchError::TooLarge { count: 11, max: 10 }));
    }

    #[tokio::test]
    async fn test_detached_execution_commits() {
        let store = Arc::new(InMemoryStore::new());
        let processor = Arc::new(processor(store.clone()));

        let result = processor
            .execute_detached(vec![op(OperationType::Create, "user", json!({"n": 1}))])
            .await;
        assert!(result.success);
        assert_eq!(store.count("user").await.unwrap(), 1);
    }

    /// Gateway whose transactions fail on the second write and on rollback
    #[derive(Debug, Default)]
    struct FlakyStore {
        rolled_back: Arc<AtomicBool>,
    }

    struct FlakyTransaction {
        writes: usize,
        rolled_back: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PersistenceGateway for FlakyStore {
        async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
            Ok(Box::new(FlakyTransaction {
                writes: 0,
                rolled_back: Arc::clone(&self.rolled_back),
            }))
        }
        async fn get(&self, _: &str, _: Uuid) -> StoreResult<Option<EntityRecord>> {
            Ok(None)
        }
        async fn list(&self, _: &str) -> StoreResult<Vec<EntityRecord>> {
            Ok(Vec::new())
        }
        async fn list_where(&self, _: &str, _: &str, _: &str) -> StoreResult<Vec<EntityRecord>> {
            Ok(Vec::new())
        }
        async fn count(&self, _: &str) -> StoreResult<u64> {
            Ok(0)
        }
        async fn ping(&self) -> StoreResult<()> {
            Ok(())
        }
        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    #[async_trait]
    impl StoreTransaction for FlakyTransaction {
        async fn create(&mut self, entity: &str, data: Value) -> StoreResult<EntityRecord> {
            self.writes += 1;
            if self.writes > 1 {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(EntityRecord::new(entity, data))
        }
        async fn update(&mut self, entity: &str, id: Uuid, _: Value) -> StoreResult<EntityRecord> {
            Err(StoreError::not_found(entity, id))
        }
        async fn delete(&mut self, entity: &str, id: Uuid) -> StoreResult<()> {
            Err(StoreError::not_found(entity, id))
        }
        async fn commit(self: Box<Self>) -> StoreResult<()> {
            Ok(())
        }
        async fn rollback(self: Box<Self>) -> StoreResult<()> {
            self.rolled_back.store(true, Ordering::SeqCst);
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn test_gateway_failure_hides_internals_and_survives_rollback_error() {
        let store = Arc::new(FlakyStore::default());
        let rolled_back = Arc::clone(&store.rolled_back);
        let metrics = ApiMetrics::new().unwrap();
        let processor = processor(store).with_metrics(metrics.clone());

        let result = processor
            .execute(&[
                op(OperationType::Create, "user", json!({})),
                op(OperationType::Create, "user", json!({})),
            ])
            .await;

        assert!(!result.success);
        assert_eq!(result.operations_completed, 0);
        let message = result.error.unwrap();
        assert!(message.contains("operation 1 (create user)"));
        assert!(message.contains("storage backend rejected the operation"));
        assert!(!message.contains("pool"));
        assert!(rolled_back.load(Ordering::SeqCst));
        assert!(metrics
            .render()
            .unwrap()
            .contains(r#"opsgate_batch_transactions_total{outcome="rolled_back"} 1"#));
    }
}
