use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The durable state of one escalation chain, keyed by `(app_id, message_id)`.
///
/// The task payload is the *only* state the chain carries between wake-ups:
/// every next-state computation derives from these fields alone, which is
/// what makes re-delivery of the same wake-up idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationTask {
    /// Feishu application (credential set) the chain runs under.
    pub app_id: String,
    /// Recipient whose read status is tracked.
    pub user_id: String,
    /// Message whose read status is tracked.
    pub message_id: String,
    /// Upper bound on successful urgent notifies. Immutable after creation.
    pub max_attempts: u32,
    /// Count of urgent notifies issued so far (0-based). Only a successful
    /// notify increments it; a failed one does not consume the budget.
    pub attempt_index: u32,
    /// Base backoff delay in seconds. Immutable after creation.
    pub initial_delay_secs: u64,
}

impl EscalationTask {
    /// Scheduler dedup tag: one pending wake-up per message, not per attempt.
    pub fn dedup_tag(&self) -> String {
        dedup_tag_for(&self.message_id)
    }

    /// Check required identifiers. A task failing validation is fatal —
    /// retrying cannot fix missing identifiers.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.app_id.is_empty() {
            return Err(AppError::Validation("app_id is empty".to_string()));
        }
        if self.user_id.is_empty() {
            return Err(AppError::Validation("user_id is empty".to_string()));
        }
        if self.message_id.is_empty() {
            return Err(AppError::Validation("message_id is empty".to_string()));
        }
        if self.attempt_index > self.max_attempts {
            return Err(AppError::Validation(format!(
                "attempt_index {} exceeds max_attempts {}",
                self.attempt_index, self.max_attempts
            )));
        }
        Ok(())
    }

    /// Copy of the task advanced (or held) at the given attempt index.
    pub fn with_attempt_index(&self, attempt_index: u32) -> Self {
        Self {
            attempt_index,
            ..self.clone()
        }
    }
}

/// Dedup tag for a message's escalation chain.
pub fn dedup_tag_for(message_id: &str) -> String {
    format!("feishu_urgent_{}", message_id)
}
