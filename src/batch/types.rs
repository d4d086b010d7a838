//! Batch request and result types

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }
}

/// One directive against a named entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub entity: String,
    #[serde(default)]
    pub data: Value,
}

/// Body of `POST /api/v1/batch-operations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub operations: Vec<BatchOperation>,
}

/// Externally visible outcome. A failed batch always reports
/// `operations_completed = 0` because nothing it did survives rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    pub operations_completed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    pub fn committed(operations_completed: usize) -> Self {
        Self {
            success: true,
            operations_completed,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            operations_completed: 0,
            error: Some(error.into()),
        }
    }
}
