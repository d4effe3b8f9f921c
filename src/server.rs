//! # Server Configuration
//!
//! Composition root for the enrichment engine: shared application state,
//! the Axum router, and startup of the background scheduler and executor
//! loops beside the API server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::auth::auth_middleware;
use crate::config::{AppConfig, CompletionConfig};
use crate::enrichment::completion::RateLimitedCompletionClient;
use crate::enrichment::layers::{
    MarketGenerationStrategy, MinimalFillStrategy, RecordFillStrategy,
};
use crate::enrichment::{CompletionClient, EnrichmentStrategy, FallbackResolver, HttpCompletionClient};
use crate::executor::{JobExecutor, ResolverProvider};
use crate::handlers;
use crate::notify::{LogNotifier, Notifier};
use crate::rate_limit::{AdminExemptions, InMemoryCounterStore, RateLimiter};
use crate::records::{InMemoryRecordStore, RecordStore};
use crate::repositories::{
    EnrichmentJobRepository, ProjectQueueSettingsRepository, ScheduleRepository,
    SecurityRepository,
};
use crate::retry::RetryPolicy;
use crate::scheduler::Scheduler;
use crate::stats::MetricsTracker;
use crate::telemetry::{self, TraceContext};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub jobs: EnrichmentJobRepository,
    pub schedules: ScheduleRepository,
    pub settings: ProjectQueueSettingsRepository,
    pub security: SecurityRepository,
    pub limiter: Arc<RateLimiter>,
    pub records: Arc<dyn RecordStore>,
    pub metrics: Arc<MetricsTracker>,
    pub executor: JobExecutor,
}

/// Builds one fallback chain per actor so each job's completion calls are
/// gated by that actor's rate budget. Chains are cached per actor.
pub struct EngineResolverProvider {
    client: Arc<dyn CompletionClient>,
    limiter: Arc<RateLimiter>,
    completion: CompletionConfig,
    model_retry: RetryPolicy,
    cache: Mutex<HashMap<String, Arc<FallbackResolver>>>,
}

impl EngineResolverProvider {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        limiter: Arc<RateLimiter>,
        completion: CompletionConfig,
        model_retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            limiter,
            completion,
            model_retry,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl ResolverProvider for EngineResolverProvider {
    fn resolver_for(&self, actor_id: &str) -> Arc<FallbackResolver> {
        let mut cache = self.cache.lock().expect("resolver cache lock");
        if let Some(resolver) = cache.get(actor_id) {
            return Arc::clone(resolver);
        }

        let gated: Arc<dyn CompletionClient> = Arc::new(RateLimitedCompletionClient::new(
            Arc::clone(&self.client),
            Arc::clone(&self.limiter),
            actor_id.to_string(),
        ));
        let strategies: Vec<Arc<dyn EnrichmentStrategy>> = vec![
            Arc::new(MarketGenerationStrategy::new(
                Arc::clone(&gated),
                self.completion.model.clone(),
            )),
            Arc::new(RecordFillStrategy::new(
                Arc::clone(&gated),
                self.completion.fill_model.clone(),
            )),
            Arc::new(MinimalFillStrategy::new()),
        ];

        let resolver = Arc::new(FallbackResolver::new(strategies, self.model_retry.clone()));
        cache.insert(actor_id.to_string(), Arc::clone(&resolver));
        resolver
    }
}

/// Wire repositories, the rate limiter, and the executor into shared state.
pub fn build_state(
    config: Arc<AppConfig>,
    db: DatabaseConnection,
    records: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
) -> Result<AppState, anyhow::Error> {
    let jobs = EnrichmentJobRepository::new(db.clone());
    let schedules = ScheduleRepository::new(db.clone());
    let settings = ProjectQueueSettingsRepository::new(db.clone());
    let security = SecurityRepository::new(db.clone());

    let counters = Arc::new(InMemoryCounterStore::new(config.rate_limit.counter_capacity));
    let exemptions = Arc::new(AdminExemptions::new(config.admin_actors.iter().cloned()));
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.clone(),
        counters,
        security.clone(),
        exemptions,
    ));

    let completion_client: Arc<dyn CompletionClient> =
        Arc::new(HttpCompletionClient::new(&config.completion)?);
    let resolvers = Arc::new(EngineResolverProvider::new(
        completion_client,
        Arc::clone(&limiter),
        config.completion.clone(),
        RetryPolicy::model_call(&config.retry),
    ));

    let executor = JobExecutor::new(
        config.executor.clone(),
        jobs.clone(),
        settings.clone(),
        resolvers,
        Arc::clone(&records),
        Arc::clone(&limiter),
        notifier,
    );

    let metrics = Arc::new(MetricsTracker::new(jobs.clone()));

    Ok(AppState {
        config,
        db,
        jobs,
        schedules,
        settings,
        security,
        limiter,
        records,
        metrics,
        executor,
    })
}

/// Attach a fresh trace context to the request so handlers and error
/// responses share one correlation id.
async fn trace_context_middleware(request: Request, next: Next) -> Response {
    let context = TraceContext {
        trace_id: Uuid::new_v4().to_string(),
    };

    let mut request = request;
    request.extensions_mut().insert(context.clone());

    telemetry::with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let protected = Router::new()
        .route(
            "/jobs",
            post(handlers::jobs::create_job).get(handlers::jobs::list_jobs),
        )
        .route(
            "/jobs/{job_id}",
            get(handlers::jobs::get_job).delete(handlers::jobs::cancel_job),
        )
        .route("/jobs/{job_id}/pause", post(handlers::jobs::pause_job))
        .route("/jobs/{job_id}/resume", post(handlers::jobs::resume_job))
        .route(
            "/projects/{project_id}/jobs/finished",
            delete(handlers::jobs::clear_finished_jobs),
        )
        .route(
            "/schedules",
            post(handlers::schedules::create_schedule).get(handlers::schedules::list_schedules),
        )
        .route(
            "/schedules/{schedule_id}",
            delete(handlers::schedules::delete_schedule),
        )
        .route(
            "/schedules/{schedule_id}/cancel",
            post(handlers::schedules::cancel_schedule),
        )
        .route(
            "/projects/{project_id}/queue-settings",
            get(handlers::projects::get_queue_settings).put(handlers::projects::put_queue_settings),
        )
        .route(
            "/projects/{project_id}/metrics",
            get(handlers::metrics::project_metrics),
        )
        .route("/security/alerts", get(handlers::security::list_alerts))
        .route(
            "/security/alerts/{alert_id}/resolve",
            post(handlers::security::resolve_alert),
        )
        .route("/security/blocks", get(handlers::security::list_blocks))
        .route(
            "/security/blocks/{actor_id}",
            delete(handlers::security::unblock_actor),
        )
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(protected)
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the API server plus the background scheduler and executor loops.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let records: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let state = build_state(Arc::clone(&config), db, records, notifier)?;

    // Jobs left running by an unclean shutdown resume from their persisted
    // progress counters.
    state
        .executor
        .recover()
        .await
        .map_err(|err| format!("job recovery failed: {}", err.message))?;

    let shutdown = CancellationToken::new();

    let scheduler = Scheduler::new(
        config.scheduler.clone(),
        state.schedules.clone(),
        state.jobs.clone(),
        Arc::clone(&state.records),
    );
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.child_token()));
    let executor_task = tokio::spawn(state.executor.clone().run(shutdown.child_token()));

    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    let _ = scheduler_task.await;
    let _ = executor_task.await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?err, "Failed to install shutdown signal handler");
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::jobs::create_job,
        crate::handlers::jobs::list_jobs,
        crate::handlers::jobs::pause_job,
        crate::handlers::jobs::resume_job,
        crate::handlers::jobs::cancel_job,
        crate::handlers::schedules::create_schedule,
        crate::handlers::schedules::list_schedules,
        crate::handlers::schedules::cancel_schedule,
        crate::handlers::projects::get_queue_settings,
        crate::handlers::projects::put_queue_settings,
        crate::handlers::metrics::project_metrics,
        crate::handlers::security::unblock_actor,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::jobs::CreateJobRequest,
            crate::handlers::jobs::JobInfo,
            crate::handlers::jobs::JobsResponse,
            crate::handlers::schedules::CreateScheduleRequest,
            crate::handlers::schedules::ScheduleInfo,
            crate::handlers::schedules::SchedulesResponse,
            crate::handlers::projects::QueueSettingsInfo,
            crate::handlers::projects::PutQueueSettingsRequest,
            crate::stats::ProjectMetrics,
            crate::stats::RunningJobEta,
            crate::handlers::security::SecurityAlertInfo,
            crate::handlers::security::BlockedActorInfo,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Enrichment Engine API",
        description = "Job orchestration API for market-intelligence record enrichment",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
