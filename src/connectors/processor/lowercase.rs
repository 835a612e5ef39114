//! Lowercase processor: rewrites configured fields of delimited files to
//! lower case.

use std::path::PathBuf;

use async_trait::async_trait;
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

pub const VARIANT: &str = "lowercase";

/// Delimiters the configuration surface may choose from.
const DELIMITER_OPTIONS: [&str; 5] = [",", ";", ":", "\t", "|"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LowercaseSettings {
    /// Fields to rewrite; others pass through untouched.
    pub csv_fields: Vec<String>,
    pub csv_delimiter: String,
    pub notify_emails: Vec<String>,
}

impl Default for LowercaseSettings {
    fn default() -> Self {
        Self {
            csv_fields: Vec::new(),
            csv_delimiter: ",".to_string(),
            notify_emails: Vec::new(),
        }
    }
}

pub struct LowercaseProcessor {
    settings: LowercaseSettings,
    scratch_root: PathBuf,
}

impl LowercaseProcessor {
    pub fn new(settings: LowercaseSettings, scratch_root: &std::path::Path) -> Self {
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

    fn delimiter(&self) -> char {
        self.settings.csv_delimiter.chars().next().unwrap_or(',')
    }

    fn lowercase_fields(&self, mut table: csv::Table) -> csv::Table {
        let indexes: Vec<usize> = table
            .headers
            .iter()
            .enumerate()
            .filter(|(_, header)| self.settings.csv_fields.contains(header))
            .map(|(index, _)| index)
            .collect();

        for row in &mut table.rows {
            for &index in &indexes {
                if let Some(field) = row.get_mut(index) {
                    if !field.is_empty() {
                        *field = field.to_lowercase();
                    }
                }
            }
        }

        table
    }
}

impl Connector for LowercaseProcessor {
    fn variant_id(&self) -> &'static str {
        VARIANT
    }

    fn name(&self) -> &str {
        "Lowercase processor"
    }

    fn settings_value(&self) -> Result<Value, ConnectorError> {
        Ok(serde_json::to_value(&self.settings)?)
    }

    fn apply_submitted(&mut self, submitted: &SubmittedSettings) -> Result<(), ConnectorError> {
        self.settings = settings::apply_overrides(&self.settings, submitted)?;
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ConnectorError> {
        if !self.settings.csv_fields.is_empty()
            && !DELIMITER_OPTIONS.contains(&self.settings.csv_delimiter.as_str())
        {
            return Err(ConnectorError::invalid_settings(
                "csv_delimiter",
                format!("must be one of {DELIMITER_OPTIONS:?}"),
            ));
        }
        Ok(())
    }

    fn notify_emails(&self) -> &[String] {
        &self.settings.notify_emails
    }
}

#[async_trait]
impl Processor for LowercaseProcessor {
    async fn process(
        &mut self,
        source: &mut dyn Source,
        target: &mut dyn Target,
        logger: &RunLogger,
        task_id: i64,
    ) -> Result<bool, ConnectorError> {
        let data = extract_from(source, logger, task_id).await?;
        let log = logger.scoped(task_id, "Lowercase processor", &self.settings.notify_emails);

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
        let delimiter = self.delimiter();
        let transform = |table: csv::Table| self.lowercase_fields(table);
        let rewritten = rewrite_files(files, &work_dir, delimiter, &log, &transform).await;

        load_into(target, &Data::with_files(rewritten), logger, task_id).await;
        Ok(true)
    }
}
