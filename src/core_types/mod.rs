//! Core types shared by every layer of the recovery core
//!
//! ## Organization
//! - `errors` - closed taxonomy: error type, severity, user impact, retry strategy
//! - `record` - canonical `ErrorRecord` and the wrapping boundary for raw failures

pub mod errors;
pub mod record;

pub use errors::{ErrorSeverity, ErrorType, RetryStrategy, UserImpact};
pub use record::{AgentFailure, ErrorContext, ErrorRecord};
