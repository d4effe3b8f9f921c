//! Integration tests for the schedule sweep.

#[path = "test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use enrich::models::schedule::{
    RECURRENCE_DAILY, RECURRENCE_ONCE, RECURRENCE_WEEKLY, STATUS_CANCELLED, STATUS_COMPLETED,
    STATUS_ERROR, STATUS_PENDING,
};
use enrich::records::{InMemoryRecordStore, TargetRecord};
use enrich::repositories::{EnrichmentJobRepository, JobListFilter, ScheduleRepository};
use enrich::scheduler::Scheduler;
use test_utils::{setup_test_db, test_config};
use uuid::Uuid;

struct Harness {
    scheduler: Scheduler,
    schedules: ScheduleRepository,
    jobs: EnrichmentJobRepository,
    store: Arc<InMemoryRecordStore>,
}

async fn harness() -> Result<Harness> {
    let db = setup_test_db().await?;
    let config = test_config();

    let schedules = ScheduleRepository::new(db.clone());
    let jobs = EnrichmentJobRepository::new(db.clone());
    let store = Arc::new(InMemoryRecordStore::new());

    let scheduler = Scheduler::new(
        config.scheduler.clone(),
        schedules.clone(),
        jobs.clone(),
        store.clone(),
    );

    Ok(Harness {
        scheduler,
        schedules,
        jobs,
        store,
    })
}

fn seed_records(store: &InMemoryRecordStore, project_id: Uuid, count: usize) {
    for index in 0..count {
        store.insert(TargetRecord {
            id: Uuid::new_v4(),
            project_id,
            name: format!("Company {index}"),
            ..Default::default()
        });
    }
}

#[tokio::test]
async fn daily_schedule_fires_and_recomputes_from_its_own_fire_time() -> Result<()> {
    let harness = harness().await?;
    let project_id = Uuid::new_v4();
    seed_records(&harness.store, project_id, 4);

    // Two hours overdue: the next occurrence must still anchor on the
    // original fire time, not on now.
    let scheduled_at = Utc::now() - ChronoDuration::hours(2);
    let schedule = harness
        .schedules
        .create(project_id, "alice", scheduled_at, RECURRENCE_DAILY, 50, None)
        .await?;

    assert_eq!(harness.scheduler.tick().await?, 1);

    let reloaded = harness
        .schedules
        .find(schedule.id)
        .await?
        .expect("schedule exists");
    assert_eq!(reloaded.status, STATUS_PENDING);
    assert_eq!(
        reloaded.scheduled_at.with_timezone(&Utc),
        scheduled_at + ChronoDuration::days(1)
    );
    assert!(reloaded.last_run_at.is_some());

    let jobs = harness
        .jobs
        .list(JobListFilter {
            project_id: Some(project_id),
            ..Default::default()
        })
        .await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].total_count, 4);
    assert_eq!(jobs[0].priority, 5);

    Ok(())
}

#[tokio::test]
async fn weekly_schedule_advances_seven_days() -> Result<()> {
    let harness = harness().await?;
    let project_id = Uuid::new_v4();
    seed_records(&harness.store, project_id, 1);

    let scheduled_at: DateTime<Utc> = "2025-01-01T10:00:00Z".parse().expect("fixed fire time");
    let schedule = harness
        .schedules
        .create(project_id, "alice", scheduled_at, RECURRENCE_WEEKLY, 50, None)
        .await?;

    assert_eq!(harness.scheduler.tick().await?, 1);

    let reloaded = harness
        .schedules
        .find(schedule.id)
        .await?
        .expect("schedule exists");
    assert_eq!(reloaded.status, STATUS_PENDING);
    assert_eq!(
        reloaded.scheduled_at.with_timezone(&Utc),
        "2025-01-08T10:00:00Z".parse::<DateTime<Utc>>().unwrap()
    );

    Ok(())
}

#[tokio::test]
async fn once_schedule_completes_and_never_fires_again() -> Result<()> {
    let harness = harness().await?;
    let project_id = Uuid::new_v4();
    seed_records(&harness.store, project_id, 2);

    let schedule = harness
        .schedules
        .create(
            project_id,
            "alice",
            Utc::now() - ChronoDuration::minutes(1),
            RECURRENCE_ONCE,
            50,
            None,
        )
        .await?;

    assert_eq!(harness.scheduler.tick().await?, 1);
    assert_eq!(harness.scheduler.tick().await?, 0);

    let reloaded = harness
        .schedules
        .find(schedule.id)
        .await?
        .expect("schedule exists");
    assert_eq!(reloaded.status, STATUS_COMPLETED);

    let jobs = harness
        .jobs
        .list(JobListFilter {
            project_id: Some(project_id),
            ..Default::default()
        })
        .await?;
    assert_eq!(jobs.len(), 1);

    Ok(())
}

#[tokio::test]
async fn max_records_caps_the_fired_batch() -> Result<()> {
    let harness = harness().await?;
    let project_id = Uuid::new_v4();
    seed_records(&harness.store, project_id, 10);

    harness
        .schedules
        .create(
            project_id,
            "alice",
            Utc::now() - ChronoDuration::minutes(1),
            RECURRENCE_ONCE,
            50,
            Some(5),
        )
        .await?;

    assert_eq!(harness.scheduler.tick().await?, 1);

    let jobs = harness
        .jobs
        .list(JobListFilter {
            project_id: Some(project_id),
            ..Default::default()
        })
        .await?;
    assert_eq!(jobs[0].total_count, 5);

    Ok(())
}

#[tokio::test]
async fn cancelled_schedule_never_fires() -> Result<()> {
    let harness = harness().await?;
    let project_id = Uuid::new_v4();
    seed_records(&harness.store, project_id, 1);

    let schedule = harness
        .schedules
        .create(
            project_id,
            "alice",
            Utc::now() - ChronoDuration::minutes(1),
            RECURRENCE_DAILY,
            50,
            None,
        )
        .await?;

    assert!(harness.schedules.cancel(schedule.id).await?);
    assert_eq!(harness.scheduler.tick().await?, 0);

    let reloaded = harness
        .schedules
        .find(schedule.id)
        .await?
        .expect("schedule exists");
    assert_eq!(reloaded.status, STATUS_CANCELLED);

    Ok(())
}

#[tokio::test]
async fn running_schedule_cannot_be_cancelled_or_claimed_twice() -> Result<()> {
    let harness = harness().await?;
    let project_id = Uuid::new_v4();

    let schedule = harness
        .schedules
        .create(
            project_id,
            "alice",
            Utc::now() - ChronoDuration::minutes(1),
            RECURRENCE_DAILY,
            50,
            None,
        )
        .await?;

    // The pending -> running transition is the sweep's mutual-exclusion
    // gate; the second claim and a cancel both lose.
    assert!(harness.schedules.try_mark_running(schedule.id).await?);
    assert!(!harness.schedules.try_mark_running(schedule.id).await?);
    assert!(!harness.schedules.cancel(schedule.id).await?);

    Ok(())
}

#[tokio::test]
async fn firing_into_an_empty_project_marks_the_schedule_errored() -> Result<()> {
    let harness = harness().await?;
    let project_id = Uuid::new_v4();

    let schedule = harness
        .schedules
        .create(
            project_id,
            "alice",
            Utc::now() - ChronoDuration::minutes(1),
            RECURRENCE_ONCE,
            50,
            None,
        )
        .await?;

    assert_eq!(harness.scheduler.tick().await?, 0);

    let reloaded = harness
        .schedules
        .find(schedule.id)
        .await?
        .expect("schedule exists");
    assert_eq!(reloaded.status, STATUS_ERROR);
    assert!(reloaded.last_error.unwrap().contains("no records"));

    Ok(())
}
