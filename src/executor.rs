//! Job queue executor.
//!
//! Tick-driven controller that claims pending jobs per project and runs them
//! under the project's concurrency discipline: strictly sequential (one in
//! flight) or bounded-parallel (up to `max_parallel_jobs` workers). Batch
//! jobs process record-by-record, persisting progress counters at every
//! record boundary so a restart resumes from `processed_count` instead of
//! zero. Pause and cancel are cooperative and take effect at those same
//! boundaries.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, histogram};
use scopeguard::defer;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::enrichment::Layer;
use crate::enrichment::resolver::FallbackResolver;
use crate::error::ApiError;
use crate::models::enrichment_job::{
    JOB_TYPE_SINGLE, Model as JobModel, STATUS_COMPLETED, STATUS_FAILED, STATUS_PAUSED,
    STATUS_RUNNING,
};
use crate::models::project_queue_settings::MODE_PARALLEL;
use crate::notify::{JobEvent, Notifier};
use crate::rate_limit::RateLimiter;
use crate::records::RecordStore;
use crate::repositories::{EnrichmentJobRepository, ProjectQueueSettingsRepository};

/// Per-actor resolver construction, so each job's external calls are gated
/// by that actor's rate budget.
pub trait ResolverProvider: Send + Sync {
    fn resolver_for(&self, actor_id: &str) -> Arc<FallbackResolver>;
}

/// In-process per-record locks. At most one job holds a record's lock at any
/// instant, under both execution modes.
#[derive(Default)]
pub struct RecordLocks {
    inner: Mutex<HashSet<Uuid>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic claim; fails if another holder exists.
    pub fn try_claim(&self, record_id: Uuid) -> bool {
        self.inner.lock().expect("record locks").insert(record_id)
    }

    pub fn release(&self, record_id: Uuid) {
        self.inner.lock().expect("record locks").remove(&record_id);
    }

    pub fn is_locked(&self, record_id: Uuid) -> bool {
        self.inner.lock().expect("record locks").contains(&record_id)
    }

    fn snapshot(&self) -> Vec<Uuid> {
        self.inner.lock().expect("record locks").iter().copied().collect()
    }
}

/// Cooperative stop flags checked at record boundaries, never mid-record.
#[derive(Default)]
struct JobControl {
    pause: AtomicBool,
    stop: AtomicBool,
}

/// Outcome of processing one record.
struct RecordOutcome {
    success: bool,
    retries: u32,
    error: Option<String>,
}

/// The queue executor. Cloneable so spawned job tasks share its state.
#[derive(Clone)]
pub struct JobExecutor {
    config: ExecutorConfig,
    jobs: EnrichmentJobRepository,
    settings: ProjectQueueSettingsRepository,
    resolvers: Arc<dyn ResolverProvider>,
    records: Arc<dyn RecordStore>,
    limiter: Arc<RateLimiter>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<RecordLocks>,
    controls: Arc<Mutex<HashMap<Uuid, Arc<JobControl>>>>,
}

impl JobExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ExecutorConfig,
        jobs: EnrichmentJobRepository,
        settings: ProjectQueueSettingsRepository,
        resolvers: Arc<dyn ResolverProvider>,
        records: Arc<dyn RecordStore>,
        limiter: Arc<RateLimiter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            jobs,
            settings,
            resolvers,
            records,
            limiter,
            notifier,
            locks: Arc::new(RecordLocks::new()),
            controls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The shared per-record lock table.
    pub fn locks(&self) -> Arc<RecordLocks> {
        Arc::clone(&self.locks)
    }

    /// Requeue jobs left `running` by an unclean shutdown. Their progress
    /// counters survive, so they resume from `processed_count`.
    pub async fn recover(&self) -> Result<u64, ApiError> {
        let requeued = self.jobs.requeue_orphaned_running().await?;
        if requeued > 0 {
            warn!(requeued, "Requeued jobs orphaned in running state");
        }
        Ok(requeued)
    }

    /// Run the executor loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(tick_ms = self.config.tick_ms, "Starting job executor");
        let tick_interval = Duration::from_millis(self.config.tick_ms);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Job executor shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    match self.tick().await {
                        Ok(admitted) if admitted > 0 => {
                            debug!(admitted, "Executor tick admitted jobs");
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = ?err, "Executor tick failed"),
                    }
                }
            }
        }

        info!("Job executor stopped");
    }

    /// One admission pass over every project with pending work.
    pub async fn tick(&self) -> Result<usize, ApiError> {
        let mut admitted = 0;

        for project_id in self.jobs.projects_with_pending_jobs().await? {
            match self.admit_project(project_id).await {
                Ok(count) => admitted += count,
                Err(err) => {
                    error!(
                        project_id = %project_id,
                        error = ?err,
                        "Failed to admit jobs for project"
                    );
                }
            }
        }

        Ok(admitted)
    }

    /// Admit pending jobs for one project up to its concurrency capacity.
    async fn admit_project(&self, project_id: Uuid) -> Result<usize, ApiError> {
        let settings = self.settings.get(project_id).await?;
        if settings.paused {
            debug!(project_id = %project_id, "Project paused, skipping admission");
            return Ok(0);
        }

        let capacity = if settings.execution_mode == MODE_PARALLEL {
            settings.max_parallel_jobs.clamp(1, 10) as u64
        } else {
            1
        };

        let running = self.jobs.running_count(project_id).await?;
        let available = capacity.saturating_sub(running);

        let mut admitted = 0;
        for _ in 0..available {
            let Some(job) = self
                .jobs
                .claim_next(project_id, &self.locks.snapshot())
                .await?
            else {
                break;
            };

            // A hard-blocked actor cannot make progress on any strategy that
            // needs the provider; fail the job rather than spin on it.
            if let Some(blocked_until) = self.limiter.active_block(&job.actor_id).await? {
                let message = format!("actor {} blocked until {}", job.actor_id, blocked_until);
                warn!(job_id = %job.id, %message, "Refusing admission for blocked actor");
                self.jobs
                    .mark_finished(job.id, STATUS_FAILED, Some(message))
                    .await?;
                self.emit(&job, STATUS_FAILED, job.processed_count, job.success_count, job.failure_count)
                    .await;
                continue;
            }

            admitted += 1;
            let executor = self.clone();
            tokio::spawn(async move {
                executor.run_job(job).await;
            });
        }

        Ok(admitted)
    }

    /// Resume a paused job: `paused -> running`, then re-spawn its runner.
    pub async fn resume(&self, job_id: Uuid) -> Result<Option<JobModel>, ApiError> {
        let Some(job) = self.jobs.mark_resumed(job_id).await? else {
            return Ok(None);
        };

        let executor = self.clone();
        let spawned = job.clone();
        tokio::spawn(async move {
            executor.run_job(spawned).await;
        });

        Ok(Some(job))
    }

    /// Ask a running job to pause at its next record boundary.
    pub fn request_pause(&self, job_id: Uuid) -> bool {
        let controls = self.controls.lock().expect("controls lock");
        match controls.get(&job_id) {
            Some(control) => {
                control.pause.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Ask a running job to stop at its next record boundary.
    pub fn request_stop(&self, job_id: Uuid) -> bool {
        let controls = self.controls.lock().expect("controls lock");
        match controls.get(&job_id) {
            Some(control) => {
                control.stop.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Whether a runner task currently exists for the job.
    pub fn is_active(&self, job_id: Uuid) -> bool {
        self.controls.lock().expect("controls lock").contains_key(&job_id)
    }

    async fn run_job(self, job: JobModel) {
        let control = Arc::new(JobControl::default());
        self.controls
            .lock()
            .expect("controls lock")
            .insert(job.id, Arc::clone(&control));

        let controls = Arc::clone(&self.controls);
        let job_id = job.id;
        defer! {
            controls.lock().expect("controls lock").remove(&job_id);
        }

        let started = std::time::Instant::now();
        self.emit(&job, STATUS_RUNNING, job.processed_count, job.success_count, job.failure_count)
            .await;

        let result = if job.job_type == JOB_TYPE_SINGLE {
            self.run_single(&job, &control).await
        } else {
            self.run_batch(&job, &control).await
        };

        match result {
            Ok(final_status) => {
                histogram!("enrichment_job_duration_seconds", &[("status", final_status)])
                    .record(started.elapsed().as_secs_f64());
                counter!("enrichment_jobs_finished_total", &[("status", final_status)])
                    .increment(1);
            }
            Err(err) => {
                error!(job_id = %job.id, error = ?err, "Job runner failed");
                let _ = self
                    .jobs
                    .mark_finished(job.id, STATUS_FAILED, Some(err.message.to_string()))
                    .await;
                self.emit(&job, STATUS_FAILED, job.processed_count, job.success_count, job.failure_count)
                    .await;
            }
        }
    }

    /// Run a single-record job.
    async fn run_single(
        &self,
        job: &JobModel,
        _control: &JobControl,
    ) -> Result<&'static str, ApiError> {
        let Some(record_id) = job.target_record_id else {
            self.jobs
                .mark_finished(job.id, STATUS_FAILED, Some("job has no target record".into()))
                .await?;
            self.emit(job, STATUS_FAILED, 0, 0, 0).await;
            return Ok(STATUS_FAILED);
        };

        // Re-processing a record that finished before a pause/restart would
        // double-count it.
        if job.processed_count >= job.total_count {
            self.jobs.mark_finished(job.id, STATUS_COMPLETED, None).await?;
            self.emit(job, STATUS_COMPLETED, job.processed_count, job.success_count, job.failure_count)
                .await;
            return Ok(STATUS_COMPLETED);
        }

        if !self.locks.try_claim(record_id) {
            // Lost a race with another in-flight job for the same record;
            // put the job back so a later tick can try again.
            warn!(job_id = %job.id, record_id = %record_id, "Target record locked, requeueing job");
            self.jobs.requeue(job.id).await?;
            return Ok(STATUS_RUNNING);
        }

        let locks = Arc::clone(&self.locks);
        defer! {
            locks.release(record_id);
        }

        let outcome = self.process_record(&job.actor_id, record_id).await;
        let (success, failure) = if outcome.success { (1, 0) } else { (0, 1) };

        self.jobs
            .update_progress(job.id, 1, success, failure, outcome.retries as i32, outcome.error)
            .await?;
        self.jobs.mark_finished(job.id, STATUS_COMPLETED, None).await?;
        self.emit(job, STATUS_COMPLETED, 1, success, failure).await;

        Ok(STATUS_COMPLETED)
    }

    /// Run a batch job record-by-record from its persisted offset.
    async fn run_batch(
        &self,
        job: &JobModel,
        control: &JobControl,
    ) -> Result<&'static str, ApiError> {
        let mut processed = job.processed_count;
        let mut success = job.success_count;
        let mut failure = job.failure_count;
        let mut retries = job.retry_count;
        let total = job.total_count;

        info!(
            job_id = %job.id,
            project_id = %job.project_id,
            processed,
            total,
            "Running batch job"
        );

        'outer: while processed < total {
            let chunk_size = (total - processed).min(self.config.default_batch_size as i32);
            let chunk = self
                .records
                .list_project_records(job.project_id, processed as usize, chunk_size as usize)
                .await
                .map_err(|err| {
                    ApiError::new(
                        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_SERVER_ERROR",
                        &format!("record listing failed: {err}"),
                    )
                })?;

            if chunk.is_empty() {
                // Fewer records than the job was sized for.
                break;
            }

            for record in chunk {
                // Safe points: record boundaries only, never mid-record.
                if control.stop.load(Ordering::SeqCst) {
                    self.jobs
                        .update_progress(job.id, processed, success, failure, retries, None)
                        .await?;
                    self.jobs
                        .mark_finished(job.id, STATUS_FAILED, Some("cancelled by user".into()))
                        .await?;
                    self.emit(job, STATUS_FAILED, processed, success, failure).await;
                    return Ok(STATUS_FAILED);
                }

                if control.pause.load(Ordering::SeqCst) {
                    self.jobs
                        .update_progress(job.id, processed, success, failure, retries, None)
                        .await?;
                    self.jobs.mark_paused(job.id).await?;
                    self.emit(job, STATUS_PAUSED, processed, success, failure).await;
                    info!(job_id = %job.id, processed, "Batch job paused");
                    return Ok(STATUS_PAUSED);
                }

                let outcome = if self.locks.try_claim(record.id) {
                    let locks = Arc::clone(&self.locks);
                    let record_id = record.id;
                    let outcome = self.process_record(&job.actor_id, record.id).await;
                    locks.release(record_id);
                    outcome
                } else {
                    RecordOutcome {
                        success: false,
                        retries: 0,
                        error: Some(format!("record {} locked by another job", record.id)),
                    }
                };

                processed += 1;
                retries += outcome.retries as i32;
                if outcome.success {
                    success += 1;
                } else {
                    failure += 1;
                }

                self.jobs
                    .update_progress(job.id, processed, success, failure, retries, outcome.error)
                    .await?;

                if processed % self.config.checkpoint_interval as i32 == 0 {
                    self.emit(job, STATUS_RUNNING, processed, success, failure).await;
                }

                if processed >= total {
                    break 'outer;
                }
            }
        }

        // Partial record failures never fail the job; `failed` is reserved
        // for total inability to proceed.
        self.jobs.mark_finished(job.id, STATUS_COMPLETED, None).await?;
        self.emit(job, STATUS_COMPLETED, processed, success, failure).await;
        info!(
            job_id = %job.id,
            processed,
            success,
            failure,
            "Batch job completed"
        );

        Ok(STATUS_COMPLETED)
    }

    /// Resolve and persist one record, containing its errors.
    async fn process_record(&self, actor_id: &str, record_id: Uuid) -> RecordOutcome {
        let resolver = self.resolvers.resolver_for(actor_id);

        let record = match self.records.load(record_id).await {
            Ok(record) => record,
            Err(err) => {
                warn!(record_id = %record_id, error = %err, "Record load failed");
                return RecordOutcome {
                    success: false,
                    retries: 0,
                    error: Some(err.to_string()),
                };
            }
        };

        let resolution = match resolver.resolve(&record).await {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(record_id = %record_id, error = %err, "Resolution failed");
                return RecordOutcome {
                    success: false,
                    retries: 0,
                    error: Some(err.to_string()),
                };
            }
        };

        let retries = resolution.retries_used;
        // The minimal-fill layer only runs once every generation strategy
        // has failed; its output is persisted so the record is never left
        // empty, but the record still counts as a failure.
        let degraded = resolution.result.layer_used == Layer::C;
        match self.records.apply(&resolution.result).await {
            Ok(()) => RecordOutcome {
                success: !degraded,
                retries,
                error: degraded
                    .then(|| "generation strategies exhausted; applied minimal fill".to_string()),
            },
            Err(err) => {
                warn!(record_id = %record_id, error = %err, "Persisting enrichment failed");
                RecordOutcome {
                    success: false,
                    retries,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn emit(
        &self,
        job: &JobModel,
        status: &str,
        processed: i32,
        success: i32,
        failure: i32,
    ) {
        self.notifier
            .notify(JobEvent {
                job_id: job.id,
                project_id: job.project_id,
                status: status.to_string(),
                processed_count: processed,
                total_count: job.total_count,
                success_count: success,
                failure_count: failure,
            })
            .await;
    }
}
