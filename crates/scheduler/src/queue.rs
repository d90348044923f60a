//! Durable one-shot job queue for escalation chains.
//!
//! Backed by the `escalation_jobs` table: one row per chain, keyed by the
//! dedup tag, so scheduling is replace-not-duplicate by construction. Claims
//! take a lease (`locked_until`) instead of deleting the row, which gives
//! at-least-once delivery: a worker that dies mid-run releases the job when
//! the lease expires.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use lark_common::error::AppError;
use lark_common::types::EscalationTask;
use lark_engine::driver::RearmScheduler;

/// Hard ceiling on a single scheduling delay (one day).
pub const MAX_DELAY_SECS: u64 = 86_400;

/// Base delay for infrastructure-level retries of a failed wake-up.
const INFRA_RETRY_BASE_SECS: u64 = 30;

/// A due job claimed by a worker for one wake-up.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub dedup_tag: String,
    pub task: EscalationTask,
    pub infra_attempts: i32,
}

/// A pending job as seen by the inspection API.
#[derive(Debug, Clone)]
pub struct PendingJob {
    pub task: EscalationTask,
    pub run_at: DateTime<Utc>,
    pub infra_attempts: i32,
}

/// Postgres-backed durable scheduler.
#[derive(Clone)]
pub struct EscalationQueue {
    pool: PgPool,
}

impl EscalationQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue (or replace) the chain's pending wake-up.
    ///
    /// Replace semantics: a second schedule for the same dedup tag overwrites
    /// the payload and fire time, clears any lease, and resets the
    /// infrastructure retry counter. The delay is clamped to [`MAX_DELAY_SECS`].
    pub async fn schedule_wakeup(
        &self,
        task: &EscalationTask,
        delay_secs: u64,
    ) -> Result<(), AppError> {
        let delay = delay_secs.min(MAX_DELAY_SECS);
        sqlx::query(
            r#"
            INSERT INTO escalation_jobs (dedup_tag, task, run_at, locked_until, infra_attempts)
            VALUES ($1, $2, NOW() + make_interval(secs => $3), NULL, 0)
            ON CONFLICT (dedup_tag) DO UPDATE SET
                task = EXCLUDED.task,
                run_at = EXCLUDED.run_at,
                locked_until = NULL,
                infra_attempts = 0,
                updated_at = NOW()
            "#,
        )
        .bind(task.dedup_tag())
        .bind(serde_json::to_value(task)?)
        .bind(delay as f64)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            dedup_tag = %task.dedup_tag(),
            delay_secs = delay,
            "Scheduled escalation wake-up"
        );
        Ok(())
    }

    /// Claim up to `batch` due jobs, leasing each for `lease_secs`.
    ///
    /// A job is due when its fire time has passed and it is not currently
    /// leased (or its lease has expired). Rows whose payload no longer
    /// decodes are dropped with an error log — that is a fatal validation
    /// failure, retrying cannot fix it.
    pub async fn claim_due(&self, batch: u32, lease_secs: u64) -> Result<Vec<ClaimedJob>, AppError> {
        let rows: Vec<(String, serde_json::Value, i32)> = sqlx::query_as(
            r#"
            UPDATE escalation_jobs
            SET locked_until = NOW() + make_interval(secs => $2), updated_at = NOW()
            WHERE dedup_tag IN (
                SELECT dedup_tag FROM escalation_jobs
                WHERE run_at <= NOW()
                  AND (locked_until IS NULL OR locked_until <= NOW())
                ORDER BY run_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING dedup_tag, task, infra_attempts
            "#,
        )
        .bind(batch as i64)
        .bind(lease_secs as f64)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for (dedup_tag, payload, infra_attempts) in rows {
            match serde_json::from_value::<EscalationTask>(payload) {
                Ok(task) => jobs.push(ClaimedJob {
                    dedup_tag,
                    task,
                    infra_attempts,
                }),
                Err(e) => {
                    tracing::error!(
                        dedup_tag = %dedup_tag,
                        error = %e,
                        "Dropping job with undecodable payload"
                    );
                    self.cancel(&dedup_tag).await?;
                }
            }
        }

        Ok(jobs)
    }

    /// Consume a claimed job after a terminal wake-up.
    ///
    /// Only removes the row while it still carries this claim's lease. A
    /// re-armed chain cleared the lease in `schedule_wakeup`, so completing
    /// the old invocation leaves the fresh wake-up untouched.
    pub async fn complete(&self, dedup_tag: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM escalation_jobs WHERE dedup_tag = $1 AND locked_until IS NOT NULL")
            .bind(dedup_tag)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Put a claimed job back for an infrastructure-level retry with the
    /// payload unchanged. Bounded: after `max_attempts` the job is dropped.
    pub async fn release_for_retry(
        &self,
        dedup_tag: &str,
        infra_attempts: i32,
        max_attempts: u32,
    ) -> Result<(), AppError> {
        let next_attempts = infra_attempts.saturating_add(1);
        if next_attempts as u32 >= max_attempts {
            tracing::error!(
                dedup_tag = %dedup_tag,
                attempts = next_attempts,
                "Infrastructure retries exhausted, dropping escalation chain"
            );
            sqlx::query("DELETE FROM escalation_jobs WHERE dedup_tag = $1")
                .bind(dedup_tag)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        let delay = INFRA_RETRY_BASE_SECS
            .saturating_mul(1u64.checked_shl(infra_attempts.max(0) as u32).unwrap_or(u64::MAX));
        sqlx::query(
            r#"
            UPDATE escalation_jobs
            SET run_at = NOW() + make_interval(secs => $2),
                locked_until = NULL,
                infra_attempts = $3,
                updated_at = NOW()
            WHERE dedup_tag = $1
            "#,
        )
        .bind(dedup_tag)
        .bind(delay as f64)
        .bind(next_attempts)
        .execute(&self.pool)
        .await?;

        tracing::warn!(
            dedup_tag = %dedup_tag,
            attempt = next_attempts,
            delay_secs = delay,
            "Released job for infrastructure retry"
        );
        Ok(())
    }

    /// Cancel a chain. Returns whether a pending job existed.
    pub async fn cancel(&self, dedup_tag: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM escalation_jobs WHERE dedup_tag = $1")
            .bind(dedup_tag)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Look up the chain's pending job, if any.
    pub async fn get(&self, dedup_tag: &str) -> Result<Option<PendingJob>, AppError> {
        let row: Option<(serde_json::Value, DateTime<Utc>, i32)> = sqlx::query_as(
            "SELECT task, run_at, infra_attempts FROM escalation_jobs WHERE dedup_tag = $1",
        )
        .bind(dedup_tag)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((payload, run_at, infra_attempts)) => Ok(Some(PendingJob {
                task: serde_json::from_value(payload)?,
                run_at,
                infra_attempts,
            })),
            None => Ok(None),
        }
    }
}

impl RearmScheduler for EscalationQueue {
    async fn schedule(&self, task: &EscalationTask, delay_secs: u64) -> Result<(), AppError> {
        self.schedule_wakeup(task, delay_secs).await
    }
}
