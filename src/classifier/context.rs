//! Situational signals that adjust a classification.
//!
//! Time of day is derived from the record's own timestamp. Everything else
//! comes from a [`TelemetryProvider`]; this crate only defines the contract.

use crate::core_types::{ErrorRecord, ErrorType};
use chrono::{Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// First hour (UTC) counted as business hours.
pub const BUSINESS_HOURS_START: u32 = 9;
/// First hour (UTC) after business hours.
pub const BUSINESS_HOURS_END: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeContext {
    BusinessHours,
    OffHours,
    Weekend,
}

impl TimeContext {
    /// Nobody is around to act on the failure right away.
    pub fn is_off_hours(&self) -> bool {
        matches!(self, Self::OffHours | Self::Weekend)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentLoad {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorFrequency {
    #[default]
    Rare,
    Occasional,
    Frequent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserActivity {
    Idle,
    #[default]
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SystemHealth {
    #[default]
    Healthy,
    Degraded,
    Critical,
}

/// Snapshot of the signals in effect when a record was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub time_context: TimeContext,
    pub agent_load: AgentLoad,
    pub error_frequency: ErrorFrequency,
    pub user_activity: UserActivity,
    pub system_health: SystemHealth,
}

impl ContextAnalysis {
    /// Neutral signals: business hours, nothing unusual.
    pub fn neutral() -> Self {
        Self {
            time_context: TimeContext::BusinessHours,
            agent_load: AgentLoad::default(),
            error_frequency: ErrorFrequency::default(),
            user_activity: UserActivity::default(),
            system_health: SystemHealth::default(),
        }
    }
}

/// Source of the runtime signals consumed by the classifier.
///
/// Implementations must be cheap and non-blocking; `classify` calls them
/// synchronously. Every method defaults to the neutral value.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetryProvider: Send + Sync {
    fn system_health(&self) -> SystemHealth {
        SystemHealth::Healthy
    }

    fn agent_load(&self, _agent_id: Option<String>) -> AgentLoad {
        AgentLoad::Normal
    }

    fn error_frequency(&self, _error_type: ErrorType, _agent_id: Option<String>) -> ErrorFrequency {
        ErrorFrequency::Rare
    }

    fn user_activity(&self, _user_id: Option<String>) -> UserActivity {
        UserActivity::Active
    }
}

/// Telemetry that reports the same fixed signals for every call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticTelemetry {
    pub system_health: SystemHealth,
    pub agent_load: AgentLoad,
    pub error_frequency: ErrorFrequency,
    pub user_activity: UserActivity,
}

impl TelemetryProvider for StaticTelemetry {
    fn system_health(&self) -> SystemHealth {
        self.system_health
    }

    fn agent_load(&self, _agent_id: Option<String>) -> AgentLoad {
        self.agent_load
    }

    fn error_frequency(&self, _error_type: ErrorType, _agent_id: Option<String>) -> ErrorFrequency {
        self.error_frequency
    }

    fn user_activity(&self, _user_id: Option<String>) -> UserActivity {
        self.user_activity
    }
}

/// Bucket a timestamp: weekends first, then the business-hours window.
pub fn time_context_for(record: &ErrorRecord) -> TimeContext {
    let ts = record.context.timestamp;
    if matches!(ts.weekday(), Weekday::Sat | Weekday::Sun) {
        return TimeContext::Weekend;
    }
    if (BUSINESS_HOURS_START..BUSINESS_HOURS_END).contains(&ts.hour()) {
        TimeContext::BusinessHours
    } else {
        TimeContext::OffHours
    }
}

/// Gather every signal for `record`.
pub fn analyze(record: &ErrorRecord, telemetry: &dyn TelemetryProvider) -> ContextAnalysis {
    let agent_id = record.context.agent_id.clone();
    ContextAnalysis {
        time_context: time_context_for(record),
        agent_load: telemetry.agent_load(agent_id.clone()),
        error_frequency: telemetry.error_frequency(record.error_type, agent_id),
        user_activity: telemetry.user_activity(record.context.user_id.clone()),
        system_health: telemetry.system_health(),
    }
}
