//! Schedule sweep.
//!
//! Background task that fires due schedules into batch jobs. The
//! `pending -> running` transition is the mutual-exclusion gate, so
//! overlapping sweeps never fire the same schedule twice; recurring
//! schedules recompute the next fire time from the previous `scheduled_at`
//! rather than from now, so cadence never drifts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::models::enrichment_job::JOB_TYPE_BATCH;
use crate::models::schedule::{Model as ScheduleModel, RECURRENCE_DAILY, RECURRENCE_WEEKLY};
use crate::records::RecordStore;
use crate::repositories::{EnrichmentJobRepository, ScheduleRepository};

/// Priority assigned to scheduler-fired batch jobs.
const SCHEDULED_JOB_PRIORITY: i16 = 5;

/// Background schedule sweep service.
pub struct Scheduler {
    config: SchedulerConfig,
    schedules: ScheduleRepository,
    jobs: EnrichmentJobRepository,
    records: Arc<dyn RecordStore>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        schedules: ScheduleRepository,
        jobs: EnrichmentJobRepository,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            config,
            schedules,
            jobs,
            records,
        }
    }

    /// Run the sweep loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_interval_seconds = self.config.tick_interval_seconds,
            "Starting schedule sweep"
        );
        let tick_interval = Duration::from_secs(self.config.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Schedule sweep shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Schedule sweep failed");
                    }
                    histogram!("schedule_sweep_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Schedule sweep stopped");
    }

    /// One due-check sweep.
    pub async fn tick(&self) -> Result<usize, crate::error::ApiError> {
        let now = Utc::now();
        let due = self.schedules.due(now, self.config.claim_batch).await?;

        if due.is_empty() {
            return Ok(0);
        }

        debug!(due = due.len(), "Found due schedules");

        let mut fired = 0;
        for schedule in due {
            match self.fire(schedule).await {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(err) => error!(error = ?err, "Failed to fire schedule"),
            }
        }

        Ok(fired)
    }

    /// Fire one schedule. Returns false when another sweep claimed it first.
    #[instrument(skip_all, fields(schedule_id = %schedule.id, project_id = %schedule.project_id))]
    async fn fire(&self, schedule: ScheduleModel) -> Result<bool, crate::error::ApiError> {
        if !self.schedules.try_mark_running(schedule.id).await? {
            debug!("Schedule already claimed by another sweep");
            return Ok(false);
        }

        let record_count = match self.records.count_project_records(schedule.project_id).await {
            Ok(count) => count,
            Err(err) => {
                self.schedules
                    .mark_error(schedule.id, &format!("record count failed: {err}"))
                    .await?;
                return Ok(false);
            }
        };

        if record_count == 0 {
            warn!("No records found for scheduled project");
            self.schedules
                .mark_error(schedule.id, "no records found for project")
                .await?;
            return Ok(false);
        }

        // Each fire covers at most one batch, optionally tightened further
        // by the schedule's record cap.
        let mut total = record_count.min(schedule.batch_size.max(1) as usize);
        if let Some(cap) = schedule.max_records
            && cap > 0
        {
            total = total.min(cap as usize);
        }
        let total = total as i32;

        let enqueue = self
            .jobs
            .enqueue(
                schedule.project_id,
                None,
                &schedule.actor_id,
                JOB_TYPE_BATCH,
                SCHEDULED_JOB_PRIORITY,
                total,
            )
            .await;

        match enqueue {
            Ok(job) => {
                let next = next_occurrence(
                    schedule.scheduled_at.with_timezone(&Utc),
                    &schedule.recurrence,
                );
                self.schedules.finish_fire(&schedule, next).await?;

                counter!("schedules_fired_total").increment(1);
                info!(
                    job_id = %job.id,
                    total,
                    recurrence = %schedule.recurrence,
                    next_scheduled_at = ?next,
                    "Schedule fired"
                );
                Ok(true)
            }
            Err(err) => {
                // Firing errors wait for a human; the sweep never silently
                // retries them.
                self.schedules
                    .mark_error(schedule.id, &format!("enqueue failed: {}", err.message))
                    .await?;
                Ok(false)
            }
        }
    }
}

/// The next fire time for a recurring schedule, anchored at the previous
/// fire time.
pub fn next_occurrence(scheduled_at: DateTime<Utc>, recurrence: &str) -> Option<DateTime<Utc>> {
    match recurrence {
        RECURRENCE_DAILY => Some(scheduled_at + ChronoDuration::days(1)),
        RECURRENCE_WEEKLY => Some(scheduled_at + ChronoDuration::days(7)),
        _ => None,
    }
}
