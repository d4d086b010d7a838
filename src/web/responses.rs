//! Response bodies of the HTTP API

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::auth::Identity;
use crate::resilience::CircuitBreakerMetrics;
use crate::store::EntityRecord;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    /// Dependency name to status
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: Identity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OperationCreatedResponse {
    pub id: Uuid,
    pub status: String,
}

/// Bookkeeping keys owned by the store; payload copies are dropped
const RESERVED_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Entity rendered for clients: stored payload plus bookkeeping fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityView {
    pub id: Uuid,
    #[serde(flatten)]
    pub data: serde_json::Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<EntityRecord> for EntityView {
    fn from(record: EntityRecord) -> Self {
        let data = match record.data {
            Value::Object(mut map) => {
                for field in RESERVED_FIELDS {
                    map.remove(field);
                }
                map
            }
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            id: record.id,
            data,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OperationsResponse {
    pub operations: Vec<EntityView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<EntityView>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExternalCallResponse {
    pub status: String,
    pub service: String,
    pub result: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadTestResponse {
    pub request_id: Value,
    pub status: String,
    pub processed_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CircuitsResponse {
    pub circuits: Vec<CircuitBreakerMetrics>,
}
