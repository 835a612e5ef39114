//! Task: one source, one processor, one target, one schedule.

use chrono_tz::Tz;

use crate::connectors::{ConnectorRegistry, Processor, Source, Target};
use crate::database::Database;
use crate::errors::EtlError;
use crate::logging::RunLogger;
use crate::models::TaskRecord;
use crate::scheduler::Scheduler;

/// Variant ids a fresh task is born with.
pub const DEFAULT_SOURCE: &str = "sftp";
pub const DEFAULT_TARGET: &str = "local_dir";
pub const DEFAULT_PROCESSOR: &str = "passthrough";

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Disabled or not due; nothing was touched.
    Skipped,
    /// The pipeline ran. Per-format failures, if any, are in the run log.
    Completed,
    /// The pipeline aborted; the schedule still advanced.
    Failed,
}

pub struct Task {
    id: i64,
    enabled: bool,
    source: Box<dyn Source>,
    target: Box<dyn Target>,
    processor: Box<dyn Processor>,
    schedule: Scheduler,
    schedule_id: i64,
}

impl Task {
    /// A fresh, unsaved task (id 0) with the default connector variants and
    /// an unconfigured schedule.
    pub fn new(registry: &ConnectorRegistry, timezone: Tz) -> Result<Self, EtlError> {
        Ok(Self {
            id: 0,
            enabled: true,
            source: registry.create_source(DEFAULT_SOURCE, "")?,
            target: registry.create_target(DEFAULT_TARGET, "")?,
            processor: registry.create_processor(DEFAULT_PROCESSOR, "")?,
            schedule: Scheduler::new(timezone),
            schedule_id: 0,
        })
    }

    /// Rehydrate a persisted task together with its schedule.
    pub async fn load(
        id: i64,
        db: &Database,
        registry: &ConnectorRegistry,
        timezone: Tz,
    ) -> Result<Self, EtlError> {
        let record = db
            .get_task(id)
            .await?
            .ok_or_else(|| EtlError::not_found("task", id.to_string()))?;

        let (schedule, schedule_id) = match db.get_schedule_for_task(id).await? {
            Some(row) => (Scheduler::from_record(&row, timezone), row.id),
            None => (Scheduler::new(timezone), 0),
        };

        Ok(Self {
            id: record.id,
            enabled: record.enabled,
            source: registry.create_source(&record.source_name, &record.source_settings)?,
            target: registry.create_target(&record.target_name, &record.target_settings)?,
            processor: registry
                .create_processor(&record.processor_name, &record.processor_settings)?,
            schedule,
            schedule_id,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_source(&mut self, source: Box<dyn Source>) {
        self.source = source;
    }

    pub fn set_target(&mut self, target: Box<dyn Target>) {
        self.target = target;
    }

    pub fn set_processor(&mut self, processor: Box<dyn Processor>) {
        self.processor = processor;
    }

    pub fn set_schedule(&mut self, schedule: Scheduler) {
        self.schedule = schedule;
    }

    pub fn schedule(&self) -> &Scheduler {
        &self.schedule
    }

    pub fn schedule_mut(&mut self) -> &mut Scheduler {
        &mut self.schedule
    }

    pub fn source(&self) -> &dyn Source {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn Source {
        self.source.as_mut()
    }

    pub fn target_mut(&mut self) -> &mut dyn Target {
        self.target.as_mut()
    }

    pub fn processor_mut(&mut self) -> &mut dyn Processor {
        self.processor.as_mut()
    }

    fn record(&self) -> Result<TaskRecord, EtlError> {
        Ok(TaskRecord {
            id: self.id,
            enabled: self.enabled,
            source_name: self.source.variant_id().to_string(),
            source_settings: self.source.settings_envelope()?,
            target_name: self.target.variant_id().to_string(),
            target_settings: self.target.settings_envelope()?,
            processor_name: self.processor.variant_id().to_string(),
            processor_settings: self.processor.settings_envelope()?,
        })
    }

    /// Insert or update the task and its schedule.
    pub async fn save(&mut self, db: &Database) -> Result<(), EtlError> {
        if self.id == 0 {
            let record = self.record()?;
            self.id = db.insert_task(&record).await?;
        } else {
            db.update_task(&self.record()?).await?;
        }

        let schedule_record = self.schedule.to_record(self.schedule_id, self.id);
        if self.schedule_id == 0 {
            self.schedule_id = db.insert_schedule(&schedule_record).await?;
        } else {
            db.update_schedule(&schedule_record).await?;
        }

        Ok(())
    }

    /// Remove the task and its schedule. Terminal.
    pub async fn delete(&self, db: &Database) -> Result<(), EtlError> {
        db.delete_task(self.id).await?;
        Ok(())
    }

    /// Run one execution attempt.
    ///
    /// No-op unless the task is enabled and due. After a due run the
    /// schedule advances and is persisted unconditionally, even when the
    /// pipeline failed, so a broken task fires at most once per interval
    /// instead of on every tick.
    pub async fn execute(&mut self, db: &Database, logger: &RunLogger) -> ExecutionOutcome {
        self.schedule.set_time(None);
        if !self.enabled || !self.schedule.is_due() {
            return ExecutionOutcome::Skipped;
        }

        let outcome = self
            .processor
            .process(
                self.source.as_mut(),
                self.target.as_mut(),
                logger,
                self.id,
            )
            .await;

        let outcome = match outcome {
            Ok(_) => ExecutionOutcome::Completed,
            Err(e) => {
                let element = self.processor.name().to_string();
                let notify = self.processor.notify_emails().to_vec();
                let log = logger.scoped(self.id, &element, &notify);
                log.error("process", &format!("Task processing failed: {e}"), &format!("{e:?}"))
                    .await;
                ExecutionOutcome::Failed
            }
        };

        self.schedule.advance(None, true, None);
        let schedule_record = self.schedule.to_record(self.schedule_id, self.id);
        let persisted = if self.schedule_id == 0 {
            db.insert_schedule(&schedule_record).await.map(|id| {
                self.schedule_id = id;
            })
        } else {
            db.update_schedule(&schedule_record).await
        };
        if let Err(e) = persisted {
            let log = logger.scoped(self.id, "Task", &[]);
            log.error("save", &format!("Failed to persist the schedule: {e}"), "")
                .await;
        }

        outcome
    }
}
