//! Shared application state for the Axum API server.

use lark_common::config::AppConfig;
use lark_scheduler::queue::EscalationQueue;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub queue: EscalationQueue,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(queue: EscalationQueue, config: AppConfig) -> Self {
        Self { queue, config }
    }
}
