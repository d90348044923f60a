//! Escalation driver — orchestrates one wake-up end to end.
//!
//! The durable scheduler fires with a persisted task snapshot; the driver
//! queries read receipts, feeds the state machine, issues the urgent notify
//! when instructed, and re-arms the scheduler with the next state and delay.
//!
//! Failure policy:
//! - malformed task → fatal, chain dropped (no retry can fix missing IDs)
//! - read-check failure → fail-open, treated as unread
//! - notify failure → budget not consumed, retried at the same interval
//! - scheduler failure → `WakeupStatus::Retry`, the host re-runs the same
//!   invocation with the payload unchanged

use std::collections::HashSet;

use uuid::Uuid;

use lark_common::error::{AppError, ClientError};
use lark_common::types::EscalationTask;

use crate::decision::{Decision, ReadCheck, decide, rearm_after_notify};

/// Read-receipt query port.
pub trait ReadReceipts {
    fn read_user_ids(
        &self,
        app_id: &str,
        message_id: &str,
    ) -> impl Future<Output = Result<HashSet<String>, ClientError>> + Send;
}

/// Urgent out-of-band notification port.
pub trait UrgentNotify {
    fn send_urgent(
        &self,
        app_id: &str,
        user_id: &str,
        message_id: &str,
        idempotency_key: Uuid,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Durable one-shot scheduling port. `schedule` replaces any pending
/// invocation with the same dedup tag, never duplicates it.
pub trait RearmScheduler {
    fn schedule(
        &self,
        task: &EscalationTask,
        delay_secs: u64,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// What the host scheduler should do with this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupStatus {
    /// Invocation consumed — either the chain ended or it was re-armed.
    Done,
    /// Infrastructure failure — re-run the same invocation shortly.
    Retry,
}

/// Glue between the scheduler, the Feishu clients, and the state machine.
pub struct EscalationDriver<R, N, S> {
    reader: R,
    notifier: N,
    scheduler: S,
}

impl<R, N, S> EscalationDriver<R, N, S>
where
    R: ReadReceipts,
    N: UrgentNotify,
    S: RearmScheduler,
{
    pub fn new(reader: R, notifier: N, scheduler: S) -> Self {
        Self {
            reader,
            notifier,
            scheduler,
        }
    }

    /// Run one wake-up for the given task snapshot.
    pub async fn run_wakeup(&self, task: &EscalationTask) -> WakeupStatus {
        if let Err(e) = task.validate() {
            tracing::error!(error = %e, "Dropping malformed escalation task");
            return WakeupStatus::Done;
        }

        let read_check = match self.reader.read_user_ids(&task.app_id, &task.message_id).await {
            Ok(readers) if readers.contains(&task.user_id) => ReadCheck::Read,
            Ok(_) => ReadCheck::Unread,
            Err(e) => {
                tracing::warn!(
                    message_id = %task.message_id,
                    error = %e,
                    "Read-status check failed, treating as unread"
                );
                ReadCheck::CheckFailed
            }
        };

        match decide(task, read_check) {
            Decision::StopRead => {
                tracing::info!(
                    message_id = %task.message_id,
                    user_id = %task.user_id,
                    "Message read, escalation chain complete"
                );
                WakeupStatus::Done
            }
            Decision::StopExhausted => {
                tracing::info!(
                    message_id = %task.message_id,
                    attempts = task.attempt_index,
                    "Attempt budget exhausted, stopping escalation"
                );
                WakeupStatus::Done
            }
            Decision::Escalate => self.escalate_and_rearm(task).await,
        }
    }

    async fn escalate_and_rearm(&self, task: &EscalationTask) -> WakeupStatus {
        let notify_sent = match self
            .notifier
            .send_urgent(&task.app_id, &task.user_id, &task.message_id, Uuid::new_v4())
            .await
        {
            Ok(()) => {
                tracing::info!(
                    message_id = %task.message_id,
                    attempt = task.attempt_index + 1,
                    max_attempts = task.max_attempts,
                    "Urgent notify sent"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    message_id = %task.message_id,
                    error = %e,
                    "Urgent notify failed, attempt budget not consumed"
                );
                false
            }
        };

        let rearm = rearm_after_notify(task, notify_sent);
        let next = task.with_attempt_index(rearm.next_attempt_index);

        match self.scheduler.schedule(&next, rearm.delay_secs).await {
            Ok(()) => {
                tracing::debug!(
                    message_id = %task.message_id,
                    next_attempt_index = rearm.next_attempt_index,
                    delay_secs = rearm.delay_secs,
                    "Re-armed escalation chain"
                );
                WakeupStatus::Done
            }
            Err(e) => {
                tracing::error!(
                    message_id = %task.message_id,
                    error = %e,
                    "Failed to re-arm scheduler, requesting infrastructure retry"
                );
                WakeupStatus::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct FakeReader {
        /// `None` simulates a failed read-status check.
        readers: Option<HashSet<String>>,
        calls: AtomicU32,
    }

    impl FakeReader {
        fn unread() -> Self {
            Self {
                readers: Some(HashSet::new()),
                calls: AtomicU32::new(0),
            }
        }

        fn read_by(user_id: &str) -> Self {
            Self {
                readers: Some(HashSet::from([user_id.to_string()])),
                calls: AtomicU32::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                readers: None,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl ReadReceipts for &FakeReader {
        async fn read_user_ids(
            &self,
            _app_id: &str,
            _message_id: &str,
        ) -> Result<HashSet<String>, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.readers
                .clone()
                .ok_or_else(|| ClientError::Transport("connection refused".to_string()))
        }
    }

    struct FakeNotifier {
        succeed: bool,
        calls: AtomicU32,
    }

    impl FakeNotifier {
        fn new(succeed: bool) -> Self {
            Self {
                succeed,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl UrgentNotify for &FakeNotifier {
        async fn send_urgent(
            &self,
            _app_id: &str,
            _user_id: &str,
            _message_id: &str,
            _idempotency_key: Uuid,
        ) -> Result<(), ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                Err(ClientError::Platform(230001))
            }
        }
    }

    #[derive(Default)]
    struct FakeScheduler {
        fail: bool,
        scheduled: Mutex<Vec<(EscalationTask, u64)>>,
    }

    impl FakeScheduler {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }
    }

    impl RearmScheduler for &FakeScheduler {
        async fn schedule(&self, task: &EscalationTask, delay_secs: u64) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::Internal("job table unavailable".to_string()));
            }
            self.scheduled.lock().unwrap().push((task.clone(), delay_secs));
            Ok(())
        }
    }

    fn make_task(max_attempts: u32, attempt_index: u32) -> EscalationTask {
        EscalationTask {
            app_id: "cli_a1b2c3".to_string(),
            user_id: "ou_user1".to_string(),
            message_id: "om_msg1".to_string(),
            max_attempts,
            attempt_index,
            initial_delay_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_read_message_terminates_without_notify() {
        let reader = FakeReader::read_by("ou_user1");
        let notifier = FakeNotifier::new(true);
        let scheduler = FakeScheduler::default();
        let driver = EscalationDriver::new(&reader, &notifier, &scheduler);

        let status = driver.run_wakeup(&make_task(3, 1)).await;

        assert_eq!(status, WakeupStatus::Done);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_budget_terminates_without_notify() {
        let reader = FakeReader::unread();
        let notifier = FakeNotifier::new(true);
        let scheduler = FakeScheduler::default();
        let driver = EscalationDriver::new(&reader, &notifier, &scheduler);

        let status = driver.run_wakeup(&make_task(3, 3)).await;

        assert_eq!(status, WakeupStatus::Done);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_budget_never_notifies() {
        let reader = FakeReader::unread();
        let notifier = FakeNotifier::new(true);
        let scheduler = FakeScheduler::default();
        let driver = EscalationDriver::new(&reader, &notifier, &scheduler);

        let status = driver.run_wakeup(&make_task(0, 0)).await;

        assert_eq!(status, WakeupStatus::Done);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_notify_rearms_with_doubled_delay() {
        let reader = FakeReader::unread();
        let notifier = FakeNotifier::new(true);
        let scheduler = FakeScheduler::default();
        let driver = EscalationDriver::new(&reader, &notifier, &scheduler);

        let status = driver.run_wakeup(&make_task(3, 0)).await;

        assert_eq!(status, WakeupStatus::Done);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        let scheduled = scheduler.scheduled.lock().unwrap();
        assert_eq!(scheduled.len(), 1);
        let (next, delay) = &scheduled[0];
        assert_eq!(next.attempt_index, 1);
        assert_eq!(*delay, 120);
    }

    #[tokio::test]
    async fn test_failed_notify_rearms_at_same_delay() {
        let reader = FakeReader::unread();
        let notifier = FakeNotifier::new(false);
        let scheduler = FakeScheduler::default();
        let driver = EscalationDriver::new(&reader, &notifier, &scheduler);

        let status = driver.run_wakeup(&make_task(3, 0)).await;

        assert_eq!(status, WakeupStatus::Done);
        let scheduled = scheduler.scheduled.lock().unwrap();
        assert_eq!(scheduled.len(), 1);
        let (next, delay) = &scheduled[0];
        assert_eq!(next.attempt_index, 0);
        assert_eq!(*delay, 60);
    }

    #[tokio::test]
    async fn test_check_failure_still_escalates() {
        let reader = FakeReader::failing();
        let notifier = FakeNotifier::new(true);
        let scheduler = FakeScheduler::default();
        let driver = EscalationDriver::new(&reader, &notifier, &scheduler);

        let status = driver.run_wakeup(&make_task(3, 1)).await;

        assert_eq!(status, WakeupStatus::Done);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        let scheduled = scheduler.scheduled.lock().unwrap();
        assert_eq!(scheduled[0].0.attempt_index, 2);
    }

    #[tokio::test]
    async fn test_malformed_task_is_fatal_without_calls() {
        let reader = FakeReader::unread();
        let notifier = FakeNotifier::new(true);
        let scheduler = FakeScheduler::default();
        let driver = EscalationDriver::new(&reader, &notifier, &scheduler);

        let mut task = make_task(3, 0);
        task.user_id.clear();
        let status = driver.run_wakeup(&task).await;

        assert_eq!(status, WakeupStatus::Done);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scheduler_failure_requests_infrastructure_retry() {
        let reader = FakeReader::unread();
        let notifier = FakeNotifier::new(true);
        let scheduler = FakeScheduler::failing();
        let driver = EscalationDriver::new(&reader, &notifier, &scheduler);

        let status = driver.run_wakeup(&make_task(3, 0)).await;

        assert_eq!(status, WakeupStatus::Retry);
    }

    #[tokio::test]
    async fn test_rerunning_same_snapshot_computes_same_state() {
        // At-least-once delivery: two runs of the same persisted snapshot
        // must produce the same next state, since nothing is carried
        // outside the task payload.
        let reader = FakeReader::unread();
        let notifier = FakeNotifier::new(true);
        let scheduler = FakeScheduler::default();
        let driver = EscalationDriver::new(&reader, &notifier, &scheduler);

        let task = make_task(3, 1);
        driver.run_wakeup(&task).await;
        driver.run_wakeup(&task).await;

        let scheduled = scheduler.scheduled.lock().unwrap();
        assert_eq!(scheduled.len(), 2);
        assert_eq!(scheduled[0], scheduled[1]);
        assert_eq!(scheduled[0].0.attempt_index, 2);
        assert_eq!(scheduled[0].1, 240);
    }
}
