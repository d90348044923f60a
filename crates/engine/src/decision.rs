//! Escalation state machine — pure decision logic for one wake-up.
//!
//! Given the task snapshot and the read-status observation, decides whether
//! the chain stops, and if not, how the next wake-up is computed. No I/O
//! happens here; the driver feeds observations in and acts on the result.
//!
//! A failed read-status check is treated as "not confirmed read" — the chain
//! keeps escalating rather than giving up on an ambiguous signal. This is a
//! deliberate product choice carried over unchanged.

use lark_common::types::EscalationTask;

/// Outcome of the read-receipt query for the tracked recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCheck {
    /// The recipient appears in the reader set.
    Read,
    /// The query succeeded and the recipient is not in the reader set.
    Unread,
    /// The query itself failed (transport, auth, or platform error).
    CheckFailed,
}

/// What this wake-up should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Message was read — chain terminates, no notify, no re-schedule.
    StopRead,
    /// Attempt budget spent and still unread — chain terminates.
    StopExhausted,
    /// Issue an urgent notify and re-arm.
    Escalate,
}

/// Next-state computation after the notify call (or its failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rearm {
    pub next_attempt_index: u32,
    pub delay_secs: u64,
}

/// Decide what a wake-up does, given the read-status observation.
pub fn decide(task: &EscalationTask, read_check: ReadCheck) -> Decision {
    match read_check {
        ReadCheck::Read => Decision::StopRead,
        // Fail-open: an unconfirmed read keeps the chain alive.
        ReadCheck::Unread | ReadCheck::CheckFailed => {
            if task.attempt_index >= task.max_attempts {
                Decision::StopExhausted
            } else {
                Decision::Escalate
            }
        }
    }
}

/// Compute the re-arm state after the urgent notify was attempted.
///
/// A successful notify consumes one attempt and moves to the next, longer
/// interval. A failed notify does not consume the budget — the chain retries
/// at the same interval that would have followed the current attempt count.
pub fn rearm_after_notify(task: &EscalationTask, notify_sent: bool) -> Rearm {
    let next_attempt_index = if notify_sent {
        task.attempt_index + 1
    } else {
        task.attempt_index
    };
    Rearm {
        next_attempt_index,
        delay_secs: backoff_delay_secs(task.initial_delay_secs, next_attempt_index),
    }
}

/// Exponential backoff: `initial * 2^attempt_index`, saturating on overflow.
pub fn backoff_delay_secs(initial_delay_secs: u64, attempt_index: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt_index).unwrap_or(u64::MAX);
    initial_delay_secs.saturating_mul(factor)
}
