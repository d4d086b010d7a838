//! Stored entity representation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One row of any entity kind. The payload is schemaless JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EntityRecord {
    pub id: Uuid,
    pub entity: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    pub fn new(entity: &str, data: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            entity: entity.to_string(),
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Shallow-merge `patch` into the payload (same semantics as JSONB `||`)
    pub fn apply_patch(&mut self, patch: Value) {
        match (&mut self.data, patch) {
            (Value::Object(current), Value::Object(patch)) => {
                current.extend(patch);
            }
            (data, patch) => *data = patch,
        }
        self.updated_at = Utc::now();
    }

    /// String field of the payload, if present
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_patch_merges_objects() {
        let mut record = EntityRecord::new("user", json!({"name": "A", "age": 1}));
        record.apply_patch(json!({"age": 2, "email": "a@example.com"}));
        assert_eq!(
            record.data,
            json!({"name": "A", "age": 2, "email": "a@example.com"})
        );
        assert!(record.updated_at >= record.created_at);
    }

    #[test]
    fn test_apply_patch_replaces_non_objects() {
        let mut record = EntityRecord::new("user", json!("scalar"));
        record.apply_patch(json!({"name": "B"}));
        assert_eq!(record.field_str("name"), Some("B"));
    }
}
