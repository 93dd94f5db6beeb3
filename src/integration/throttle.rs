//! Per-agent error counters and throttle state.
//!
//! NORMAL → THROTTLED once the running error count reaches
//! `escalate_after_failures`, back to NORMAL on the first check after the
//! cool-down has passed. Clearing the throttle also restarts the count.

use crate::config::AgentErrorConfig;
use crate::logging::{log_info, log_warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// What counting one more error did to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ErrorTally {
    pub(crate) error_count: u32,
    pub(crate) throttled: bool,
    /// This error is the one that crossed the threshold
    pub(crate) newly_throttled: bool,
}

#[derive(Debug)]
pub(crate) struct AgentState {
    agent_id: String,
    pub(crate) config: AgentErrorConfig,
    pub(crate) error_count: u32,
    pub(crate) throttled_until: Option<Instant>,
}

impl AgentState {
    fn new(agent_id: &str, config: AgentErrorConfig) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            config,
            error_count: 0,
            throttled_until: None,
        }
    }

    /// Clear an expired throttle. Returns whether the agent is still throttled.
    pub(crate) fn refresh(&mut self, now: Instant) -> bool {
        match self.throttled_until {
            Some(until) if now >= until => {
                log_info!(
                    agent_id = %self.agent_id,
                    error_count = self.error_count,
                    "Agent throttle cleared"
                );
                self.throttled_until = None;
                self.error_count = 0;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub(crate) fn record_error(&mut self, now: Instant, cooldown: Duration) -> ErrorTally {
        let was_throttled = self.refresh(now);
        self.error_count = self.error_count.saturating_add(1);

        let newly_throttled =
            !was_throttled && self.error_count >= self.config.escalate_after_failures;
        if newly_throttled {
            log_warn!(
                agent_id = %self.agent_id,
                error_count = self.error_count,
                threshold = self.config.escalate_after_failures,
                cooldown_secs = cooldown.as_secs(),
                "Agent throttled after repeated errors"
            );
            self.throttled_until = Some(now + cooldown);
        }

        ErrorTally {
            error_count: self.error_count,
            throttled: was_throttled || newly_throttled,
            newly_throttled,
        }
    }

    pub(crate) fn remaining(&self, now: Instant) -> Option<Duration> {
        self.throttled_until
            .map(|until| until.saturating_duration_since(now))
    }

    pub(crate) fn reset(&mut self) {
        self.error_count = 0;
        self.throttled_until = None;
    }
}

/// Agent state keyed by agent id, one lock per agent.
#[derive(Debug, Default)]
pub(crate) struct AgentRegistry {
    agents: Mutex<HashMap<String, Arc<Mutex<AgentState>>>>,
}

impl AgentRegistry {
    /// Register `agent_id`, or replace the config of an already registered agent.
    ///
    /// Counters and throttle state survive re-registration.
    pub(crate) fn register(&self, agent_id: &str, config: AgentErrorConfig) -> bool {
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        match agents.get(agent_id) {
            Some(handle) => {
                handle.lock().unwrap_or_else(PoisonError::into_inner).config = config;
                false
            }
            None => {
                agents.insert(
                    agent_id.to_string(),
                    Arc::new(Mutex::new(AgentState::new(agent_id, config))),
                );
                true
            }
        }
    }

    fn handle(&self, agent_id: &str) -> Option<Arc<Mutex<AgentState>>> {
        self.agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .cloned()
    }

    /// Run `f` atomically against the state of `agent_id`, if registered.
    pub(crate) fn with_agent<R>(
        &self,
        agent_id: &str,
        f: impl FnOnce(&mut AgentState) -> R,
    ) -> Option<R> {
        let handle = self.handle(agent_id)?;
        let mut state = handle.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut state))
    }

    pub(crate) fn remove(&self, agent_id: &str) -> bool {
        self.agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent_id)
            .is_some()
    }
}
