//! Periodic task runner and the task configuration entrypoints.

use std::sync::Arc;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::connectors::ConnectorRegistry;
use crate::database::Database;
use crate::errors::EtlError;
use crate::logging::RunLogger;
use crate::models::{ScheduleInput, SubmittedSettings};
use crate::notify::Notifier;
use crate::task::{ExecutionOutcome, Task};

/// A task configuration as submitted by the admin surface: the chosen
/// variant per role, a flat settings map per role, and the schedule fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// 0 creates a new task; anything else edits an existing one.
    pub id: i64,
    pub enabled: bool,
    pub source_name: String,
    pub source_settings: SubmittedSettings,
    pub target_name: String,
    pub target_settings: SubmittedSettings,
    pub processor_name: String,
    pub processor_settings: SubmittedSettings,
    pub schedule: ScheduleInput,
}

/// Counts for one runner invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: i64,
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct TaskRunner {
    db: Database,
    registry: Arc<ConnectorRegistry>,
    notifier: Option<Notifier>,
    timezone: Tz,
}

impl TaskRunner {
    pub fn new(
        db: Database,
        registry: Arc<ConnectorRegistry>,
        notifier: Option<Notifier>,
        timezone: Tz,
    ) -> Self {
        Self {
            db,
            registry,
            notifier,
            timezone,
        }
    }

    /// Execute every due task once, sequentially, in listing order.
    ///
    /// One misbehaving task never aborts the batch: load and execution
    /// problems are logged against the task and the loop moves on.
    pub async fn run_due_tasks(&self) -> Result<RunSummary, EtlError> {
        let run_id = self.db.begin_run().await?;
        let logger = RunLogger::new(self.db.clone(), run_id, self.notifier.clone());
        info!("Starting task run {run_id}");

        let mut summary = RunSummary {
            run_id,
            ..RunSummary::default()
        };

        for task_id in self.db.list_task_ids().await? {
            match Task::load(task_id, &self.db, &self.registry, self.timezone).await {
                Ok(mut task) => match task.execute(&self.db, &logger).await {
                    ExecutionOutcome::Completed => summary.executed += 1,
                    ExecutionOutcome::Skipped => summary.skipped += 1,
                    ExecutionOutcome::Failed => summary.failed += 1,
                },
                Err(e) => {
                    summary.failed += 1;
                    error!("Task {task_id} could not be loaded: {e}");
                    logger
                        .scoped(task_id, "Task", &[])
                        .error("load", &format!("Task could not be loaded: {e}"), "")
                        .await;
                }
            }
        }

        info!(
            "Task run {run_id} finished: {} executed, {} skipped, {} failed",
            summary.executed, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// Create or update a task from a submitted configuration.
    ///
    /// Connectors are built fresh for the chosen variants, the submitted
    /// settings applied and validated, and only then is anything persisted.
    pub async fn save_task(&self, submission: &TaskSubmission) -> Result<i64, EtlError> {
        let mut source = self.registry.create_source(&submission.source_name, "")?;
        source.apply_submitted(&submission.source_settings)?;
        source.validate_settings()?;

        let mut target = self.registry.create_target(&submission.target_name, "")?;
        target.apply_submitted(&submission.target_settings)?;
        target.validate_settings()?;

        let mut processor = self
            .registry
            .create_processor(&submission.processor_name, "")?;
        processor.apply_submitted(&submission.processor_settings)?;
        processor.validate_settings()?;

        let mut task = if submission.id == 0 {
            Task::new(&self.registry, self.timezone)?
        } else {
            Task::load(submission.id, &self.db, &self.registry, self.timezone).await?
        };

        task.set_enabled(submission.enabled);
        task.set_source(source);
        task.set_target(target);
        task.set_processor(processor);
        task.schedule_mut().apply_user_input(&submission.schedule);
        task.save(&self.db).await?;

        Ok(task.id())
    }

    /// Delete a task and its schedule.
    pub async fn delete_task(&self, id: i64) -> Result<(), EtlError> {
        let task = Task::load(id, &self.db, &self.registry, self.timezone).await?;
        task.delete(&self.db).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::connectors::BuildContext;
    use crate::models::FrequencyClass;
    use crate::transfer::CurlClientFactory;
    use std::collections::HashMap;

    /// A registry over throwaway scratch/data directories and the test pool.
    pub(crate) async fn registry_for(db: &Database) -> ConnectorRegistry {
        let root = std::env::temp_dir().join("etl-runner-tests");
        std::fs::create_dir_all(&root).unwrap();
        ConnectorRegistry::with_builtins(BuildContext {
            scratch_root: root.join("scratch"),
            data_root: root.join("out"),
            pool: db.pool(),
            transfer_clients: Arc::new(CurlClientFactory),
            timezone: chrono_tz::UTC,
            query_user_id: 0,
        })
    }

    fn folder_to_local_submission(
        source_dir: &std::path::Path,
        target_dir: &std::path::Path,
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
            processor_name: "passthrough".to_string(),
            processor_settings: HashMap::new(),
            schedule: ScheduleInput {
                frequency: FrequencyClass::Daily,
                schedule_param: 0,
                initialize_now: true,
            },
        }
    }

    async fn runner_for(db: &Database) -> TaskRunner {
        let registry = Arc::new(registry_for(db).await);
        TaskRunner::new(db.clone(), registry, None, chrono_tz::UTC)
    }

    #[tokio::test]
    async fn due_tasks_run_once_per_interval() {
        let db = crate::database::test_database().await;
        let runner = runner_for(&db).await;

        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        std::fs::write(source_dir.path().join("users.csv"), "name\nalice\n").unwrap();

        let task_id = runner
            .save_task(&folder_to_local_submission(source_dir.path(), target_dir.path()))
            .await
            .unwrap();
        assert!(task_id > 0);

        let summary = runner.run_due_tasks().await.unwrap();
        assert_eq!(summary.executed, 1);
        assert_eq!(summary.failed, 0);
        assert!(target_dir.path().join("users.csv").is_file());

        // The schedule advanced; the next pass has nothing to do.
        let summary = runner.run_due_tasks().await.unwrap();
        assert_eq!(summary.executed, 0);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn a_broken_task_never_aborts_the_batch() {
        let db = crate::database::test_database().await;
        let runner = runner_for(&db).await;

        // A task whose stored source variant no longer exists.
        let broken_id = db
            .insert_task(&crate::models::TaskRecord {
                id: 0,
                enabled: true,
                source_name: "retired_variant".to_string(),
                source_settings: "{}".to_string(),
                target_name: "local_dir".to_string(),
                target_settings: "{}".to_string(),
                processor_name: "passthrough".to_string(),
                processor_settings: "{}".to_string(),
            })
            .await
            .unwrap();

        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        std::fs::write(source_dir.path().join("ok.csv"), "name\nbob\n").unwrap();
        runner
            .save_task(&folder_to_local_submission(source_dir.path(), target_dir.path()))
            .await
            .unwrap();

        let summary = runner.run_due_tasks().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.executed, 1);
        assert!(target_dir.path().join("ok.csv").is_file());

        let entries = db.logs_for_task(broken_id).await.unwrap();
        assert!(entries.iter().any(|e| e.log_type == "ERROR"));
    }

    #[tokio::test]
    async fn save_task_rejects_invalid_settings() {
        let db = crate::database::test_database().await;
        let runner = runner_for(&db).await;

        let mut submission = folder_to_local_submission(
            std::path::Path::new("/srv/in"),
            std::path::Path::new("/srv/out"),
        );
        submission.source_settings.insert("file_regex".to_string(), "(".to_string());

        assert!(runner.save_task(&submission).await.is_err());
        assert!(db.list_task_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_task_updates_in_place() {
        let db = crate::database::test_database().await;
        let runner = runner_for(&db).await;

        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let mut submission =
            folder_to_local_submission(source_dir.path(), target_dir.path());

        let id = runner.save_task(&submission).await.unwrap();
        submission.id = id;
        submission.enabled = false;
        let same_id = runner.save_task(&submission).await.unwrap();
        assert_eq!(same_id, id);
        assert_eq!(db.list_task_ids().await.unwrap().len(), 1);

        let record = db.get_task(id).await.unwrap().unwrap();
        assert!(!record.enabled);

        runner.delete_task(id).await.unwrap();
        assert!(db.list_task_ids().await.unwrap().is_empty());
    }
}
