//! Notifier seam.
//!
//! The engine emits an event on every job state transition; how events reach
//! users (email, stream, push) is the consuming notifier's concern.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Snapshot emitted on a job state transition or checkpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub status: String,
    pub processed_count: i32,
    pub total_count: i32,
    pub success_count: i32,
    pub failure_count: i32,
}

/// Delivery capability for job events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: JobEvent);
}

/// Default notifier: structured log lines, picked up by whatever ships them.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: JobEvent) {
        info!(
            job_id = %event.job_id,
            project_id = %event.project_id,
            status = %event.status,
            processed = event.processed_count,
            total = event.total_count,
            success = event.success_count,
            failure = event.failure_count,
            "Job event"
        );
    }
}
