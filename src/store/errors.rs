//! Persistence gateway error types

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Update or delete targeted a row that does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: Uuid },

    /// The write set conflicts with state committed since it was staged
    #[error("Conflict on {entity} {id}: {reason}")]
    Conflict {
        entity: String,
        id: Uuid,
        reason: String,
    },

    #[error("Invalid entity data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>, id: Uuid) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id,
        }
    }

    /// Message safe to show API clients; database internals are withheld
    pub fn client_message(&self) -> String {
        match self {
            StoreError::NotFound { .. }
            | StoreError::Conflict { .. }
            | StoreError::InvalidData(_) => self.to_string(),
            StoreError::Database(_) | StoreError::Migration(_) => {
                "storage backend rejected the operation".to_string()
            }
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
