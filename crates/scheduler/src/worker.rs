//! Worker loop that fires due escalation wake-ups.
//!
//! Claims a batch of due jobs, runs one driver invocation per job on the
//! tokio pool, and settles each claim according to the driver's status.
//! Chains share no state, so the batch is embarrassingly parallel; within a
//! chain the single leased row serializes wake-ups.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use lark_common::config::AppConfig;
use lark_engine::driver::{EscalationDriver, ReadReceipts, UrgentNotify, WakeupStatus};

use crate::queue::EscalationQueue;

pub struct EscalationWorker<R, N> {
    queue: EscalationQueue,
    driver: Arc<EscalationDriver<R, N, EscalationQueue>>,
    poll_interval: Duration,
    batch_size: u32,
    lease_secs: u64,
    max_infra_attempts: u32,
}

impl<R, N> EscalationWorker<R, N>
where
    R: ReadReceipts + Send + Sync + 'static,
    N: UrgentNotify + Send + Sync + 'static,
{
    pub fn new(queue: EscalationQueue, reader: R, notifier: N, config: &AppConfig) -> Self {
        let driver = Arc::new(EscalationDriver::new(reader, notifier, queue.clone()));
        Self {
            queue,
            driver,
            poll_interval: Duration::from_millis(config.worker_poll_interval_ms),
            batch_size: config.worker_batch_size,
            lease_secs: config.worker_lease_secs,
            max_infra_attempts: config.max_infra_attempts,
        }
    }

    /// Start the polling loop. Runs indefinitely until the task is cancelled.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.batch_size,
            lease_secs = self.lease_secs,
            "Escalation worker started"
        );

        loop {
            let jobs = match self.queue.claim_due(self.batch_size, self.lease_secs).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim due jobs");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            tracing::debug!(jobs = jobs.len(), "Claimed due escalation jobs");

            let mut running = JoinSet::new();
            for job in jobs {
                let driver = Arc::clone(&self.driver);
                let queue = self.queue.clone();
                let max_infra_attempts = self.max_infra_attempts;

                running.spawn(async move {
                    let status = driver.run_wakeup(&job.task).await;
                    let settled = match status {
                        WakeupStatus::Done => queue.complete(&job.dedup_tag).await,
                        WakeupStatus::Retry => {
                            queue
                                .release_for_retry(
                                    &job.dedup_tag,
                                    job.infra_attempts,
                                    max_infra_attempts,
                                )
                                .await
                        }
                    };
                    if let Err(e) = settled {
                        tracing::error!(
                            dedup_tag = %job.dedup_tag,
                            error = %e,
                            "Failed to settle claimed job, lease will expire"
                        );
                    }
                });
            }
            while running.join_next().await.is_some() {}
        }
    }
}
