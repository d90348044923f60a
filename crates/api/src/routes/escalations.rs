//! Escalation chain routes: create, inspect, cancel.
//!
//! Creating a chain schedules its first wake-up after the base delay; the
//! worker owns everything from there. Cancellation is a terminal abandonment
//! with no compensating action.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lark_common::error::AppError;
use lark_common::types::{EscalationTask, dedup_tag_for};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/escalations", post(create_escalation))
        .route("/api/escalations/{message_id}", get(get_escalation))
        .route("/api/escalations/{message_id}", delete(cancel_escalation))
}

#[derive(Debug, Deserialize)]
pub struct CreateEscalationParams {
    pub app_id: String,
    pub user_id: String,
    pub message_id: String,
    /// Escalation attempt budget; configured default when omitted.
    pub max_attempts: Option<u32>,
    /// Base backoff delay in seconds; configured default when omitted.
    pub initial_delay_secs: Option<u64>,
}

impl CreateEscalationParams {
    /// Build the chain's initial task, filling defaults from config.
    pub fn into_task(self, default_max_attempts: u32, default_initial_delay_secs: u64) -> EscalationTask {
        EscalationTask {
            app_id: self.app_id,
            user_id: self.user_id,
            message_id: self.message_id,
            max_attempts: self.max_attempts.unwrap_or(default_max_attempts),
            attempt_index: 0,
            initial_delay_secs: self
                .initial_delay_secs
                .unwrap_or(default_initial_delay_secs),
        }
    }
}

#[derive(Debug, Serialize)]
struct EscalationCreated {
    dedup_tag: String,
    first_check_in_secs: u64,
}

#[derive(Debug, Serialize)]
struct EscalationStatus {
    task: EscalationTask,
    next_wakeup_at: DateTime<Utc>,
    infra_attempts: i32,
}

/// POST /api/escalations — Start tracking a freshly sent message.
async fn create_escalation(
    State(state): State<AppState>,
    Json(params): Json<CreateEscalationParams>,
) -> Result<Json<EscalationCreated>, AppError> {
    let task = params.into_task(
        state.config.default_max_attempts,
        state.config.default_initial_delay_secs,
    );
    task.validate()?;

    let delay = task.initial_delay_secs;
    state.queue.schedule_wakeup(&task, delay).await?;

    tracing::info!(
        message_id = %task.message_id,
        user_id = %task.user_id,
        max_attempts = task.max_attempts,
        "Escalation chain created"
    );

    Ok(Json(EscalationCreated {
        dedup_tag: task.dedup_tag(),
        first_check_in_secs: delay,
    }))
}

/// GET /api/escalations/:message_id — Inspect the pending wake-up.
async fn get_escalation(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<EscalationStatus>, AppError> {
    let pending = state
        .queue
        .get(&dedup_tag_for(&message_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No escalation chain for {}", message_id)))?;

    Ok(Json(EscalationStatus {
        task: pending.task,
        next_wakeup_at: pending.run_at,
        infra_attempts: pending.infra_attempts,
    }))
}

/// DELETE /api/escalations/:message_id — Cancel the chain.
async fn cancel_escalation(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cancelled = state.queue.cancel(&dedup_tag_for(&message_id)).await?;
    if cancelled {
        tracing::info!(message_id = %message_id, "Escalation chain cancelled");
        Ok(Json(serde_json::json!({"cancelled": true})))
    } else {
        Err(AppError::NotFound(format!(
            "No escalation chain for {}",
            message_id
        )))
    }
}
