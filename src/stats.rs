//! Progress/metrics read model.
//!
//! On-demand aggregation over job rows: throughput and error rate over the
//! trailing 24 hours, mean processing time, and an ETA for each running
//! batch job. Read-only; nothing here mutates engine state.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::enrichment_job::{Model as JobModel, STATUS_COMPLETED, STATUS_FAILED};
use crate::repositories::EnrichmentJobRepository;

/// Aggregated metrics for one project.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectMetrics {
    /// Jobs completed in the trailing 24 h, divided by 24.
    pub throughput_per_hour: f64,
    /// failed / (failed + completed) over the same window, as a percentage.
    pub error_rate_pct: f64,
    /// Mean `completed_at - started_at` over completed jobs, in seconds.
    pub average_processing_seconds: f64,
    /// ETA per running job.
    pub running: Vec<RunningJobEta>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RunningJobEta {
    pub job_id: Uuid,
    pub remaining_records: i32,
    /// `remaining * average per-record duration`; absent until at least one
    /// record has completed somewhere in the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
}

/// Read model over the jobs table.
pub struct MetricsTracker {
    jobs: EnrichmentJobRepository,
}

impl MetricsTracker {
    pub fn new(jobs: EnrichmentJobRepository) -> Self {
        Self { jobs }
    }

    /// Compute metrics for a project as of `now`.
    pub async fn project_metrics(
        &self,
        project_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ProjectMetrics, ApiError> {
        let since = now - ChronoDuration::hours(24);

        let completed = self
            .jobs
            .finished_since(project_id, STATUS_COMPLETED, since)
            .await?;
        let failed = self
            .jobs
            .finished_since(project_id, STATUS_FAILED, since)
            .await?;
        let running = self.jobs.running_jobs(project_id).await?;

        Ok(compute_metrics(&completed, failed.len(), &running))
    }
}

/// Pure aggregation over already-fetched job rows.
pub fn compute_metrics(
    completed: &[JobModel],
    failed_count: usize,
    running: &[JobModel],
) -> ProjectMetrics {
    let completed_count = completed.len();
    let throughput_per_hour = completed_count as f64 / 24.0;

    let finished = completed_count + failed_count;
    let error_rate_pct = if finished == 0 {
        0.0
    } else {
        failed_count as f64 / finished as f64 * 100.0
    };

    let durations: Vec<f64> = completed
        .iter()
        .filter_map(|job| {
            let started = job.started_at?;
            let finished = job.completed_at?;
            Some((finished - started).num_milliseconds() as f64 / 1_000.0)
        })
        .collect();
    let average_processing_seconds = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    let per_record_seconds = per_record_duration(completed);

    let running = running
        .iter()
        .map(|job| {
            let remaining = (job.total_count - job.processed_count).max(0);
            RunningJobEta {
                job_id: job.id,
                remaining_records: remaining,
                eta_seconds: per_record_seconds.map(|avg| avg * remaining as f64),
            }
        })
        .collect();

    ProjectMetrics {
        throughput_per_hour,
        error_rate_pct,
        average_processing_seconds,
        running,
    }
}

/// Average seconds per processed record over completed jobs.
fn per_record_duration(completed: &[JobModel]) -> Option<f64> {
    let mut total_seconds = 0.0;
    let mut total_records = 0i64;

    for job in completed {
        if let (Some(started), Some(finished)) = (job.started_at, job.completed_at)
            && job.processed_count > 0
        {
            total_seconds += (finished - started).num_milliseconds() as f64 / 1_000.0;
            total_records += i64::from(job.processed_count);
        }
    }

    (total_records > 0).then(|| total_seconds / total_records as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enrichment_job::{JOB_TYPE_BATCH, STATUS_RUNNING};

    fn job(
        status: &str,
        processed: i32,
        total: i32,
        duration_seconds: Option<i64>,
    ) -> JobModel {
        let started = Utc::now() - ChronoDuration::hours(1);
        JobModel {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            target_record_id: None,
            actor_id: "alice".to_string(),
            job_type: JOB_TYPE_BATCH.to_string(),
            status: status.to_string(),
            priority: 0,
            total_count: total,
            processed_count: processed,
            success_count: processed,
            failure_count: 0,
            retry_count: 0,
            last_error: None,
            started_at: Some(started.fixed_offset()),
            completed_at: duration_seconds
                .map(|secs| (started + ChronoDuration::seconds(secs)).fixed_offset()),
            created_at: started.fixed_offset(),
            updated_at: started.fixed_offset(),
        }
    }

    #[test]
    fn throughput_is_completed_jobs_over_24h()  {
        let completed = vec![
            job(STATUS_COMPLETED, 10, 10, Some(60)),
            job(STATUS_COMPLETED, 5, 5, Some(30)),
        ];

        let metrics = compute_metrics(&completed, 0, &[]);
        assert!((metrics.throughput_per_hour - 2.0 / 24.0).abs() < f64::EPSILON);
    }

    #[test]
    fn error_rate_is_failed_over_finished() {
        let completed = vec![job(STATUS_COMPLETED, 10, 10, Some(60))];

        let metrics = compute_metrics(&completed, 1, &[]);
        assert!((metrics.error_rate_pct - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn error_rate_with_no_finished_jobs_is_zero() {
        let metrics = compute_metrics(&[], 0, &[]);
        assert_eq!(metrics.error_rate_pct, 0.0);
    }

    #[test]
    fn average_processing_is_mean_of_completed_durations() {
        let completed = vec![
            job(STATUS_COMPLETED, 10, 10, Some(60)),
            job(STATUS_COMPLETED, 10, 10, Some(120)),
        ];

        let metrics = compute_metrics(&completed, 0, &[]);
        assert!((metrics.average_processing_seconds - 90.0).abs() < 0.01);
    }

    #[test]
    fn eta_scales_remaining_by_per_record_average() {
        // 20 records in 100 seconds: 5 seconds per record.
        let completed = vec![job(STATUS_COMPLETED, 20, 20, Some(100))];
        let running = vec![job(STATUS_RUNNING, 4, 10, None)];

        let metrics = compute_metrics(&completed, 0, &running);
        let eta = metrics.running[0].eta_seconds.unwrap();
        assert_eq!(metrics.running[0].remaining_records, 6);
        assert!((eta - 30.0).abs() < 0.01);
    }

    #[test]
    fn eta_is_absent_without_history() {
        let running = vec![job(STATUS_RUNNING, 0, 10, None)];

        let metrics = compute_metrics(&[], 0, &running);
        assert!(metrics.running[0].eta_seconds.is_none());
    }
}
