//! Persistent run log
//!
//! Every runner invocation owns one [`RunLogger`] carrying the invocation's
//! run id. Connectors never log through it directly; they receive a
//! [`ScopedLogger`] that pins the task id and element name for the duration
//! of one call, so the logging identity is explicit arguments instead of
//! process-global state.
//!
//! Entries are written to the `etl_logs` table and mirrored to `tracing`.
//! ERROR entries additionally trigger an email attempt when the owning
//! connector has notification addresses configured; a failed notification is
//! itself logged but never propagated.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::database::Database;
use crate::models::{LogLevel, LogRecord};
use crate::notify::Notifier;

pub struct RunLogger {
    db: Database,
    run_id: i64,
    notifier: Option<Notifier>,
}

impl RunLogger {
    pub fn new(db: Database, run_id: i64, notifier: Option<Notifier>) -> Self {
        Self {
            db,
            run_id,
            notifier,
        }
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// A logging scope for one connector call within one task.
    pub fn scoped<'a>(
        &'a self,
        task_id: i64,
        element: &'a str,
        notify: &'a [String],
    ) -> ScopedLogger<'a> {
        ScopedLogger {
            logger: self,
            task_id,
            element,
            notify,
        }
    }

    async fn write(
        &self,
        task_id: i64,
        element: &str,
        level: LogLevel,
        action: &str,
        message: &str,
        trace: &str,
        notify: &[String],
    ) {
        match level {
            LogLevel::Info => info!(run_id = self.run_id, task_id, element, action, "{message}"),
            LogLevel::Warning => {
                warn!(run_id = self.run_id, task_id, element, action, "{message}")
            }
            LogLevel::Error => {
                error!(run_id = self.run_id, task_id, element, action, "{message}")
            }
        }

        let record = LogRecord {
            id: 0,
            time: Utc::now().timestamp(),
            run_id: self.run_id,
            task_id,
            log_type: level.as_str().to_string(),
            element: element.to_string(),
            action: truncate(action, 255),
            info: message.to_string(),
            trace: trace.to_string(),
        };
        if let Err(e) = self.db.insert_log(&record).await {
            error!("Failed to write run log entry: {e}");
        }

        if level == LogLevel::Error && !notify.is_empty() {
            if let Some(notifier) = &self.notifier {
                let subject = format!("[etl-runner] task {task_id}: {element} failed");
                let body = format!(
                    "Run {run_id}, task {task_id}\nElement: {element}\nAction: {action}\n\n{message}\n\n{trace}",
                    run_id = self.run_id
                );
                if let Err(e) = notifier.send(notify, &subject, &body).await {
                    error!(task_id, element, "Failure notification could not be sent: {e}");
                }
            }
        }
    }
}

/// Logging identity for one connector call: run id via the parent logger,
/// plus the task and element being worked on.
pub struct ScopedLogger<'a> {
    logger: &'a RunLogger,
    task_id: i64,
    element: &'a str,
    notify: &'a [String],
}

impl ScopedLogger<'_> {
    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    pub fn element(&self) -> &str {
        self.element
    }

    pub async fn info(&self, action: &str, message: &str) {
        self.logger
            .write(
                self.task_id,
                self.element,
                LogLevel::Info,
                action,
                message,
                "",
                self.notify,
            )
            .await;
    }

    pub async fn warning(&self, action: &str, message: &str) {
        self.logger
            .write(
                self.task_id,
                self.element,
                LogLevel::Warning,
                action,
                message,
                "",
                self.notify,
            )
            .await;
    }

    pub async fn error(&self, action: &str, message: &str, trace: &str) {
        self.logger
            .write(
                self.task_id,
                self.element,
                LogLevel::Error,
                action,
                message,
                trace,
                self.notify,
            )
            .await;
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_database;

    #[tokio::test]
    async fn scoped_entries_carry_run_task_and_element() {
        let db = test_database().await;
        let run_id = db.begin_run().await.unwrap();
        let logger = RunLogger::new(db.clone(), run_id, None);

        let scope = logger.scoped(7, "Folder source", &[]);
        scope.info("extract", "3 files matched").await;
        scope
            .error("extract", "directory vanished", "trace goes here")
            .await;

        let entries = db.logs_for_run(run_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].task_id, 7);
        assert_eq!(entries[0].element, "Folder source");
        assert_eq!(entries[0].log_type, "INFO");
        assert_eq!(entries[1].log_type, "ERROR");
        assert_eq!(entries[1].trace, "trace goes here");
    }

    #[tokio::test]
    async fn long_actions_are_truncated() {
        let db = test_database().await;
        let run_id = db.begin_run().await.unwrap();
        let logger = RunLogger::new(db.clone(), run_id, None);

        let long_action = "x".repeat(600);
        logger.scoped(1, "element", &[]).info(&long_action, "").await;

        let entries = db.logs_for_run(run_id).await.unwrap();
        assert_eq!(entries[0].action.len(), 255);
    }
}
