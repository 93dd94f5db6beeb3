//! Logging utilities for agent-recovery
//!
//! Re-exports tracing macros with log_* naming so every module logs the same way.
//! Field names used across the crate: `error_type`, `agent_id`, `error_id`,
//! `attempt`, `max_retries`, `delay_ms`.

pub use tracing::{
    debug as log_debug,
    error as log_error,
    info as log_info,
    warn as log_warn,
};
