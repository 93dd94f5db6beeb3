//! In-flight operation correlation records.

use crate::core_types::{ErrorContext, ErrorType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// What an agent was doing when it started, succeeded or failed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationContext {
    pub agent_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    /// Type used for failures that arrive as plain errors
    pub error_type: Option<ErrorType>,
    /// Retries already spent on this operation (0 on the first run)
    pub retry_attempt: u32,
    pub metadata: HashMap<String, Value>,
}

impl OperationContext {
    pub fn new(agent_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_error_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = Some(error_type);
        self
    }

    pub fn with_retry_attempt(mut self, retry_attempt: u32) -> Self {
        self.retry_attempt = retry_attempt;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.metadata.insert(key.into(), value);
        self
    }

    pub(crate) fn error_context(&self) -> ErrorContext {
        let mut context = ErrorContext::for_agent(&self.agent_id).with_operation(&self.operation);
        context.user_id = self.user_id.clone();
        context
    }
}

/// Live correlation record for one started operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOperation {
    pub id: Uuid,
    pub agent_id: String,
    pub operation: String,
    pub start_time: DateTime<Utc>,
    pub context: OperationContext,
}

/// Started operations, removed exactly once when they finish.
#[derive(Debug, Default)]
pub(crate) struct OperationTracker {
    operations: Mutex<HashMap<Uuid, AgentOperation>>,
}

impl OperationTracker {
    pub(crate) fn start(&self, context: OperationContext) -> Uuid {
        let id = Uuid::new_v4();
        let operation = AgentOperation {
            id,
            agent_id: context.agent_id.clone(),
            operation: context.operation.clone(),
            start_time: Utc::now(),
            context,
        };
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, operation);
        id
    }

    /// Remove and return the record; `None` if it was never started or already finished.
    pub(crate) fn finish(&self, id: Uuid) -> Option<AgentOperation> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub(crate) fn count_for(&self, agent_id: &str) -> usize {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|op| op.agent_id == agent_id)
            .count()
    }

    pub(crate) fn snapshot(&self) -> Vec<AgentOperation> {
        let mut operations: Vec<_> = self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        operations.sort_by_key(|op| op.start_time);
        operations
    }

    pub(crate) fn drop_agent(&self, agent_id: &str) -> usize {
        let mut operations = self.operations.lock().unwrap_or_else(PoisonError::into_inner);
        let before = operations.len();
        operations.retain(|_, op| op.agent_id != agent_id);
        before - operations.len()
    }
}
