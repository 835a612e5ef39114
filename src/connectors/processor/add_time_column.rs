//! Time-column processor: appends a timestamp column to delimited files.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{rewrite_files, work_dir_for};
use crate::connectors::settings::{self, SettingsEnvelope};
use crate::connectors::{
    extract_from, load_into, BuildContext, Connector, Processor, Source, Target,
};
use crate::csv;
use crate::data::{Data, Format};
use crate::errors::ConnectorError;
use crate::logging::RunLogger;
use crate::models::SubmittedSettings;

pub const VARIANT: &str = "add_time_column";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AddTimeColumnSettings {
    /// Name of the appended column.
    pub target_column: String,
    /// chrono format string; empty writes raw Unix seconds.
    pub date_format: String,
    pub notify_emails: Vec<String>,
}

pub struct AddTimeColumnProcessor {
    settings: AddTimeColumnSettings,
    scratch_root: PathBuf,
}

impl AddTimeColumnProcessor {
    pub fn new(settings: AddTimeColumnSettings, scratch_root: &std::path::Path) -> Self {
        Self {
            settings,
            scratch_root: scratch_root.to_path_buf(),
        }
    }

    pub fn from_envelope(
        ctx: &BuildContext,
        envelope: &SettingsEnvelope,
    ) -> Result<Self, ConnectorError> {
        Ok(Self::new(envelope.unpack(VARIANT)?, &ctx.scratch_root))
    }

    /// Append the time column to the header and every row.
    ///
    /// The timestamp is rendered once per processing pass so every row of
    /// every file in the batch carries the same value.
    fn append_time_column(&self, mut table: csv::Table, stamp: &str) -> csv::Table {
        if table.rows.is_empty() {
            return table;
        }
        table.headers.push(self.settings.target_column.clone());
        for row in &mut table.rows {
            row.push(stamp.to_string());
        }
        table
    }

    fn render_stamp(&self, now: chrono::DateTime<Utc>) -> String {
        if self.settings.date_format.is_empty() {
            now.timestamp().to_string()
        } else {
            now.format(&self.settings.date_format).to_string()
        }
    }
}

impl Connector for AddTimeColumnProcessor {
    fn variant_id(&self) -> &'static str {
        VARIANT
    }

    fn name(&self) -> &str {
        "Timeformat processor"
    }

    fn settings_value(&self) -> Result<Value, ConnectorError> {
        Ok(serde_json::to_value(&self.settings)?)
    }

    fn apply_submitted(&mut self, submitted: &SubmittedSettings) -> Result<(), ConnectorError> {
        self.settings = settings::apply_overrides(&self.settings, submitted)?;
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ConnectorError> {
        if self.settings.target_column.is_empty() {
            return Err(ConnectorError::invalid_settings(
                "target_column",
                "a column name is required",
            ));
        }
        Ok(())
    }

    fn notify_emails(&self) -> &[String] {
        &self.settings.notify_emails
    }
}

#[async_trait]
impl Processor for AddTimeColumnProcessor {
    async fn process(
        &mut self,
        source: &mut dyn Source,
        target: &mut dyn Target,
        logger: &RunLogger,
        task_id: i64,
    ) -> Result<bool, ConnectorError> {
        let data = extract_from(source, logger, task_id).await?;
        let log = logger.scoped(task_id, "Timeformat processor", &self.settings.notify_emails);

        if !data.holds(Format::Files) {
            log.warning("process", "No data to process").await;
            return Ok(true);
        }
        let files = data.files()?;
        if files.is_empty() {
            log.warning("process", "No files to process").await;
            return Ok(true);
        }

        let work_dir = work_dir_for(&self.scratch_root, VARIANT);
        let stamp = self.render_stamp(Utc::now());
        let transform = |table: csv::Table| self.append_time_column(table, &stamp);
        let rewritten = rewrite_files(files, &work_dir, ',', &log, &transform).await;

        load_into(target, &Data::with_files(rewritten), logger, task_id).await;
        Ok(true)
    }
}
