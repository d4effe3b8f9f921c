//! Integration tests for the enrichment engine HTTP surface.

#[path = "test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;

use enrich::notify::LogNotifier;
use enrich::records::{InMemoryRecordStore, TargetRecord};
use enrich::server::{build_state, create_app};
use reqwest::Client;
use serde_json::Value;
use test_utils::{setup_test_db, test_config};
use uuid::Uuid;

const ALICE: &str = "tok-alice";
const ROOT: &str = "tok-root";

/// Starts the API (without background loops) on a random port and returns
/// its base URL plus the seeded record store.
async fn start_test_server() -> (String, Arc<InMemoryRecordStore>) {
    let db = setup_test_db().await.expect("test database");
    let config = Arc::new(test_config());
    let store = Arc::new(InMemoryRecordStore::new());

    let state = build_state(config, db, store.clone(), Arc::new(LogNotifier))
        .expect("app state builds");
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    (format!("http://{}", addr), store)
}

fn seed_records(store: &InMemoryRecordStore, project_id: Uuid, count: usize) -> Vec<Uuid> {
    (0..count)
        .map(|index| {
            let id = Uuid::new_v4();
            store.insert(TargetRecord {
                id,
                project_id,
                name: format!("Company {index}"),
                ..Default::default()
            });
            id
        })
        .collect()
}

#[tokio::test]
async fn root_returns_service_info() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();

    let response = client
        .get(format!("{base}/"))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["service"], "enrich");
}

#[tokio::test]
async fn healthz_pings_the_database() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();

    let response = client
        .get(format!("{base}/healthz"))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();

    let missing = client
        .get(format!("{base}/jobs"))
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(missing.status(), 401);
    assert_eq!(
        missing.headers().get("content-type").unwrap(),
        "application/problem+json"
    );

    let wrong = client
        .get(format!("{base}/jobs"))
        .bearer_auth("tok-mallory")
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(wrong.status(), 401);
}

#[tokio::test]
async fn batch_job_enqueues_and_is_listable() {
    let (base, store) = start_test_server().await;
    let client = Client::new();
    let project_id = Uuid::new_v4();
    seed_records(&store, project_id, 3);

    let created = client
        .post(format!("{base}/jobs"))
        .bearer_auth(ALICE)
        .json(&serde_json::json!({ "project_id": project_id, "priority": 7 }))
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(created.status(), 201);

    let job: Value = created.json().await.expect("json body");
    assert_eq!(job["job_type"], "batch");
    assert_eq!(job["status"], "pending");
    assert_eq!(job["total_count"], 3);
    assert_eq!(job["priority"], 7);

    let listed = client
        .get(format!("{base}/jobs?project_id={project_id}&status=pending"))
        .bearer_auth(ALICE)
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(listed.status(), 200);
    let body: Value = listed.json().await.expect("json body");
    assert_eq!(body["jobs"].as_array().unwrap().len(), 1);

    let job_id = job["id"].as_str().unwrap();
    let fetched = client
        .get(format!("{base}/jobs/{job_id}"))
        .bearer_auth(ALICE)
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(fetched.status(), 200);
}

#[tokio::test]
async fn single_job_for_unknown_record_is_rejected() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{base}/jobs"))
        .bearer_auth(ALICE)
        .json(&serde_json::json!({
            "project_id": Uuid::new_v4(),
            "target_record_id": Uuid::new_v4(),
        }))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn out_of_range_priority_is_rejected() {
    let (base, store) = start_test_server().await;
    let client = Client::new();
    let project_id = Uuid::new_v4();
    seed_records(&store, project_id, 1);

    let response = client
        .post(format!("{base}/jobs"))
        .bearer_auth(ALICE)
        .json(&serde_json::json!({ "project_id": project_id, "priority": 11 }))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn queue_settings_roundtrip() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();
    let project_id = Uuid::new_v4();

    // Defaults before anything is stored.
    let defaults = client
        .get(format!("{base}/projects/{project_id}/queue-settings"))
        .bearer_auth(ALICE)
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(defaults.status(), 200);
    let body: Value = defaults.json().await.expect("json body");
    assert_eq!(body["execution_mode"], "sequential");

    let updated = client
        .put(format!("{base}/projects/{project_id}/queue-settings"))
        .bearer_auth(ALICE)
        .json(&serde_json::json!({
            "execution_mode": "parallel",
            "max_parallel_jobs": 5,
        }))
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(updated.status(), 200);
    let body: Value = updated.json().await.expect("json body");
    assert_eq!(body["execution_mode"], "parallel");
    assert_eq!(body["max_parallel_jobs"], 5);

    let invalid = client
        .put(format!("{base}/projects/{project_id}/queue-settings"))
        .bearer_auth(ALICE)
        .json(&serde_json::json!({
            "execution_mode": "parallel",
            "max_parallel_jobs": 11,
        }))
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(invalid.status(), 400);
}

#[tokio::test]
async fn schedule_lifecycle_over_http() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();
    let project_id = Uuid::new_v4();

    let created = client
        .post(format!("{base}/schedules"))
        .bearer_auth(ALICE)
        .json(&serde_json::json!({
            "project_id": project_id,
            "scheduled_at": "2026-06-01T10:00:00Z",
            "recurrence": "weekly",
            "batch_size": 25,
        }))
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(created.status(), 201);
    let schedule: Value = created.json().await.expect("json body");
    assert_eq!(schedule["status"], "pending");
    assert_eq!(schedule["recurrence"], "weekly");

    let schedule_id = schedule["id"].as_str().unwrap();
    let cancelled = client
        .post(format!("{base}/schedules/{schedule_id}/cancel"))
        .bearer_auth(ALICE)
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(cancelled.status(), 200);
    let body: Value = cancelled.json().await.expect("json body");
    assert_eq!(body["status"], "cancelled");

    // Cancelling twice is a conflict: the schedule is no longer pending.
    let again = client
        .post(format!("{base}/schedules/{schedule_id}/cancel"))
        .bearer_auth(ALICE)
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(again.status(), 409);

    let deleted = client
        .delete(format!("{base}/schedules/{schedule_id}"))
        .bearer_auth(ALICE)
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(deleted.status(), 204);
}

#[tokio::test]
async fn invalid_recurrence_is_rejected() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{base}/schedules"))
        .bearer_auth(ALICE)
        .json(&serde_json::json!({
            "project_id": Uuid::new_v4(),
            "scheduled_at": "2026-06-01T10:00:00Z",
            "recurrence": "hourly",
        }))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn metrics_endpoint_reports_an_empty_project() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();
    let project_id = Uuid::new_v4();

    let response = client
        .get(format!("{base}/projects/{project_id}/metrics"))
        .bearer_auth(ALICE)
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["throughput_per_hour"], 0.0);
    assert_eq!(body["error_rate_pct"], 0.0);
    assert!(body["running"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unblocking_an_actor_is_admin_only() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();

    let forbidden = client
        .delete(format!("{base}/security/blocks/bob"))
        .bearer_auth(ALICE)
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(forbidden.status(), 403);

    // Admin passes the role check; there is just no block to lift.
    let missing = client
        .delete(format!("{base}/security/blocks/bob"))
        .bearer_auth(ROOT)
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn security_alerts_start_empty() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();

    let response = client
        .get(format!("{base}/security/alerts"))
        .bearer_auth(ALICE)
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json body");
    assert!(body["alerts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (base, _store) = start_test_server().await;
    let client = Client::new();

    let response = client
        .get(format!("{base}/openapi.json"))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["info"]["title"], "Enrichment Engine API");
}
