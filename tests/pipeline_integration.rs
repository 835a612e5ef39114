//! End-to-end pipeline tests driving the public API: configure tasks the
//! way the admin surface does, run them through the periodic entrypoint,
//! and observe files, schedules and the run log.

use std::collections::HashMap;
use std::sync::Arc;

use etl_runner::config::DatabaseConfig;
use etl_runner::connectors::{BuildContext, ConnectorRegistry};
use etl_runner::database::Database;
use etl_runner::models::{FrequencyClass, ScheduleInput};
use etl_runner::runner::{TaskRunner, TaskSubmission};
use etl_runner::transfer::CurlClientFactory;

struct Harness {
    db: Database,
    runner: TaskRunner,
    _scratch: tempfile::TempDir,
}

async fn harness() -> Harness {
    let db = Database::new(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: Some(2),
    })
    .await
    .unwrap();
    db.migrate().await.unwrap();

    let scratch = tempfile::tempdir().unwrap();
    let registry = Arc::new(ConnectorRegistry::with_builtins(BuildContext {
        scratch_root: scratch.path().join("scratch"),
        data_root: scratch.path().join("out"),
        pool: db.pool(),
        transfer_clients: Arc::new(CurlClientFactory),
        timezone: chrono_tz::UTC,
        query_user_id: 0,
    }));
    let runner = TaskRunner::new(db.clone(), registry, None, chrono_tz::UTC);

    Harness {
        db,
        runner,
        _scratch: scratch,
    }
}

fn submission(
    source_dir: &std::path::Path,
    target_dir: &std::path::Path,
    processor: &str,
    processor_settings: HashMap<String, String>,
) -> TaskSubmission {
    TaskSubmission {
        id: 0,
        enabled: true,
        source_name: "folder".to_string(),
        source_settings: HashMap::from([
            ("folder".to_string(), source_dir.display().to_string()),
            ("file_regex".to_string(), r"\.csv$".to_string()),
        ]),
        target_name: "local_dir".to_string(),
        target_settings: HashMap::from([
            ("path".to_string(), target_dir.display().to_string()),
            ("backup_files".to_string(), "0".to_string()),
        ]),
        processor_name: processor.to_string(),
        processor_settings,
        schedule: ScheduleInput {
            frequency: FrequencyClass::Daily,
            schedule_param: 0,
            initialize_now: true,
        },
    }
}

#[tokio::test]
async fn passthrough_pipeline_copies_files_end_to_end() {
    let h = harness().await;
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("users.csv"), "name\nAlice\n").unwrap();
    std::fs::write(source_dir.path().join("skip.txt"), "not matched").unwrap();

    let task_id = h
        .runner
        .save_task(&submission(
            source_dir.path(),
            target_dir.path(),
            "passthrough",
            HashMap::new(),
        ))
        .await
        .unwrap();

    let summary = h.runner.run_due_tasks().await.unwrap();
    assert_eq!(summary.executed, 1);

    assert_eq!(
        std::fs::read_to_string(target_dir.path().join("users.csv")).unwrap(),
        "name\nAlice\n"
    );
    assert!(!target_dir.path().join("skip.txt").exists());

    // The run log captured the copy under the target's element name.
    let entries = h.db.logs_for_task(task_id).await.unwrap();
    assert!(entries
        .iter()
        .any(|e| e.element == "Local directory" && e.log_type == "INFO"));
}

#[tokio::test]
async fn lowercase_pipeline_rewrites_fields_before_loading() {
    let h = harness().await;
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        source_dir.path().join("users.csv"),
        "username,city\nALICE,Berlin\n",
    )
    .unwrap();

    h.runner
        .save_task(&submission(
            source_dir.path(),
            target_dir.path(),
            "lowercase",
            HashMap::from([
                ("csv_fields".to_string(), "username".to_string()),
                ("csv_delimiter".to_string(), ",".to_string()),
            ]),
        ))
        .await
        .unwrap();

    let summary = h.runner.run_due_tasks().await.unwrap();
    assert_eq!(summary.executed, 1);

    let loaded = std::fs::read_to_string(target_dir.path().join("users.csv")).unwrap();
    assert_eq!(loaded, "username,city\nalice,Berlin\n");
}

#[tokio::test]
async fn add_time_column_pipeline_appends_the_column() {
    let h = harness().await;
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("events.csv"), "event\nlogin\n").unwrap();

    h.runner
        .save_task(&submission(
            source_dir.path(),
            target_dir.path(),
            "add_time_column",
            HashMap::from([("target_column".to_string(), "exported_at".to_string())]),
        ))
        .await
        .unwrap();

    h.runner.run_due_tasks().await.unwrap();

    let loaded = std::fs::read_to_string(target_dir.path().join("events.csv")).unwrap();
    let mut lines = loaded.lines();
    assert_eq!(lines.next().unwrap(), "event,exported_at");
    assert!(lines.next().unwrap().starts_with("login,"));
}

#[tokio::test]
async fn disabled_tasks_are_left_alone() {
    let h = harness().await;
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("users.csv"), "name\nAlice\n").unwrap();

    let mut disabled = submission(
        source_dir.path(),
        target_dir.path(),
        "passthrough",
        HashMap::new(),
    );
    disabled.enabled = false;
    let task_id = h.runner.save_task(&disabled).await.unwrap();

    let summary = h.runner.run_due_tasks().await.unwrap();
    assert_eq!(summary.executed, 0);
    assert_eq!(summary.skipped, 1);

    assert!(!target_dir.path().join("users.csv").exists());
    assert!(h.db.logs_for_task(task_id).await.unwrap().is_empty());

    // The schedule did not advance: the task would still be due.
    let schedule = h.db.get_schedule_for_task(task_id).await.unwrap().unwrap();
    assert!(schedule.next_event_time < chrono::Utc::now().timestamp());
}

#[tokio::test]
async fn unavailable_source_logs_and_advances_the_schedule() {
    let h = harness().await;
    let target_dir = tempfile::tempdir().unwrap();

    let task_id = h
        .runner
        .save_task(&submission(
            std::path::Path::new("/nonexistent/source/dir"),
            target_dir.path(),
            "passthrough",
            HashMap::new(),
        ))
        .await
        .unwrap();

    let summary = h.runner.run_due_tasks().await.unwrap();
    assert_eq!(summary.failed, 1);

    let entries = h.db.logs_for_task(task_id).await.unwrap();
    assert!(entries.iter().any(|e| e.log_type == "ERROR"));

    // At-most-once-per-interval: the broken task is no longer due.
    let schedule = h.db.get_schedule_for_task(task_id).await.unwrap().unwrap();
    assert!(schedule.next_event_time > chrono::Utc::now().timestamp());

    let summary = h.runner.run_due_tasks().await.unwrap();
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn each_run_shares_one_run_id_across_tasks() {
    let h = harness().await;

    let mut dirs = Vec::new();
    for _ in 0..2 {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        std::fs::write(source_dir.path().join("data.csv"), "h\nv\n").unwrap();
        h.runner
            .save_task(&submission(
                source_dir.path(),
                target_dir.path(),
                "passthrough",
                HashMap::new(),
            ))
            .await
            .unwrap();
        dirs.push((source_dir, target_dir));
    }

    let summary = h.runner.run_due_tasks().await.unwrap();
    assert_eq!(summary.executed, 2);

    let entries = h.db.logs_for_run(summary.run_id).await.unwrap();
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e.run_id == summary.run_id));

    let task_ids: std::collections::BTreeSet<i64> = entries.iter().map(|e| e.task_id).collect();
    assert_eq!(task_ids.len(), 2);
}

#[tokio::test]
async fn overwrite_guard_holds_across_runs() {
    let h = harness().await;
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("users.csv"), "v2").unwrap();
    std::fs::write(target_dir.path().join("users.csv"), "v1").unwrap();

    let mut guarded = submission(
        source_dir.path(),
        target_dir.path(),
        "passthrough",
        HashMap::new(),
    );
    guarded
        .target_settings
        .insert("overwrite".to_string(), "0".to_string());
    let task_id = h.runner.save_task(&guarded).await.unwrap();

    h.runner.run_due_tasks().await.unwrap();

    assert_eq!(
        std::fs::read_to_string(target_dir.path().join("users.csv")).unwrap(),
        "v1"
    );
    let entries = h.db.logs_for_task(task_id).await.unwrap();
    assert!(entries.iter().any(|e| e.log_type == "WARNING"));
}
