//! Canonical failure representation.
//!
//! Raw failures become an [`ErrorRecord`] exactly once, at the boundary where
//! they are caught ([`ErrorRecord::from_anyhow`] / [`AgentFailure::into_record`]).
//! Code past that boundary only ever sees records.

use super::errors::{ErrorSeverity, ErrorType, UserImpact};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Who hit the failure, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    /// Name of the operation that failed, if known
    pub operation: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            agent_id: None,
            user_id: None,
            operation: None,
            timestamp: Utc::now(),
        }
    }
}

impl ErrorContext {
    /// Context for a failure raised by `agent_id`, stamped now.
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Override the timestamp (time-of-day analysis reads it).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A failure, as the rest of the crate sees it.
///
/// Implements [`std::error::Error`] so operations can return it through
/// `anyhow` and have it recovered intact by [`ErrorRecord::from_anyhow`].
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{error_type}: {message}")]
pub struct ErrorRecord {
    pub id: Uuid,
    pub error_type: ErrorType,
    pub message: String,
    pub severity: ErrorSeverity,
    pub user_impact: UserImpact,
    pub retryable: bool,
    /// How many retries already happened before this failure
    pub retry_attempt: u32,
    pub max_retries: u32,
    pub context: ErrorContext,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ErrorRecord {
    /// New record with the type's default classification fields.
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            error_type,
            message: message.into(),
            severity: error_type.default_severity(),
            user_impact: error_type.default_user_impact(),
            retryable: error_type.default_retryable(),
            retry_attempt: 0,
            max_retries: error_type.default_max_retries(),
            context: ErrorContext::default(),
            metadata: HashMap::new(),
        }
    }

    /// Wrap a failure returned by a caller-supplied operation.
    ///
    /// A record travelling inside the `anyhow::Error` is returned as-is.
    /// Anything else is wrapped with default classification fields, typed by
    /// `type_hint` or, failing that, by keyword inference on the message.
    pub fn from_anyhow(
        error: anyhow::Error,
        type_hint: Option<ErrorType>,
        context: ErrorContext,
    ) -> Self {
        match error.downcast::<ErrorRecord>() {
            Ok(record) => record,
            Err(error) => {
                let message = format!("{error:#}");
                let error_type =
                    type_hint.unwrap_or_else(|| ErrorType::infer_from_message(&message));
                Self::new(error_type, message).with_context(context)
            }
        }
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_user_impact(mut self, user_impact: UserImpact) -> Self {
        self.user_impact = user_impact;
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_retry_attempt(mut self, retry_attempt: u32) -> Self {
        self.retry_attempt = retry_attempt;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Attach a metadata entry; values that fail to serialize are skipped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }
}

/// A failure handed to the agent integration layer.
///
/// Callers either already hold a canonical record or just have an error;
/// the variant says which, so nothing downstream has to guess.
#[derive(Debug)]
pub enum AgentFailure {
    Record(ErrorRecord),
    Raw(anyhow::Error),
}

impl AgentFailure {
    /// Failure described only by a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Raw(anyhow::Error::msg(message.into()))
    }

    /// Move a record carried inside a raw error into the `Record` variant.
    pub fn normalize(self) -> Self {
        match self {
            Self::Raw(error) => match error.downcast::<ErrorRecord>() {
                Ok(record) => Self::Record(record),
                Err(error) => Self::Raw(error),
            },
            record => record,
        }
    }

    /// Turn the failure into its canonical record.
    ///
    /// Plain errors get `context` and `retry_attempt`. Existing records,
    /// including ones carried inside an `anyhow::Error`, are kept unchanged.
    pub fn into_record(
        self,
        type_hint: Option<ErrorType>,
        context: ErrorContext,
        retry_attempt: u32,
    ) -> ErrorRecord {
        match self.normalize() {
            Self::Record(record) => record,
            Self::Raw(error) => ErrorRecord::from_anyhow(error, type_hint, context)
                .with_retry_attempt(retry_attempt),
        }
    }
}

impl From<ErrorRecord> for AgentFailure {
    fn from(record: ErrorRecord) -> Self {
        Self::Record(record)
    }
}

impl From<anyhow::Error> for AgentFailure {
    fn from(error: anyhow::Error) -> Self {
        Self::Raw(error).normalize()
    }
}
