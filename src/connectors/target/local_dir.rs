//! Local directory target: copies and writes payloads under a directory
//! inside the runner's data root.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{backup_files, FileNaming};
use crate::connectors::settings::{self, SettingsEnvelope};
use crate::connectors::{BuildContext, Connector, Target};
use crate::csv;
use crate::data::Record;
use crate::errors::ConnectorError;
use crate::logging::ScopedLogger;
use crate::models::SubmittedSettings;

pub const VARIANT: &str = "local_dir";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalDirTargetSettings {
    /// Directory below the data root (or an absolute path).
    pub path: String,
    pub create_if_missing: bool,
    #[serde(flatten)]
    pub naming: FileNaming,
    pub overwrite: bool,
    pub backup_files: bool,
    pub notify_emails: Vec<String>,
}

impl Default for LocalDirTargetSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            create_if_missing: false,
            naming: FileNaming::default(),
            overwrite: true,
            backup_files: true,
            notify_emails: Vec::new(),
        }
    }
}

pub struct LocalDirTarget {
    settings: LocalDirTargetSettings,
    data_root: PathBuf,
}

impl LocalDirTarget {
    pub fn new(settings: LocalDirTargetSettings, data_root: &std::path::Path) -> Self {
        Self {
            settings,
            data_root: data_root.to_path_buf(),
        }
    }

    pub fn from_envelope(
        ctx: &BuildContext,
        envelope: &SettingsEnvelope,
    ) -> Result<Self, ConnectorError> {
        Ok(Self::new(envelope.unpack(VARIANT)?, &ctx.data_root))
    }

    fn full_path(&self) -> PathBuf {
        self.data_root.join(&self.settings.path)
    }

    /// Target path for a format that writes a single file; `None` when no
    /// fixed file name is configured.
    fn fixed_target(&self) -> Option<PathBuf> {
        self.settings
            .naming
            .fixed_name(Utc::now())
            .map(|name| self.full_path().join(name))
    }

    async fn guard_overwrite(
        &self,
        target: &std::path::Path,
        log: &ScopedLogger<'_>,
    ) -> bool {
        if target.exists() && !self.settings.overwrite {
            log.warning(
                "load_data",
                &format!(
                    "Skip writing {}: file exists and overwriting is disabled",
                    target.display()
                ),
            )
            .await;
            return false;
        }
        true
    }
}

impl Connector for LocalDirTarget {
    fn variant_id(&self) -> &'static str {
        VARIANT
    }

    fn name(&self) -> &str {
        "Local directory"
    }

    fn settings_value(&self) -> Result<Value, ConnectorError> {
        Ok(serde_json::to_value(&self.settings)?)
    }

    fn apply_submitted(&mut self, submitted: &SubmittedSettings) -> Result<(), ConnectorError> {
        self.settings = settings::apply_overrides(&self.settings, submitted)?;
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ConnectorError> {
        if self.settings.create_if_missing && self.settings.path.is_empty() {
            return Err(ConnectorError::invalid_settings(
                "path",
                "a path is required when the directory should be created",
            ));
        }
        Ok(())
    }

    fn notify_emails(&self) -> &[String] {
        &self.settings.notify_emails
    }
}

#[async_trait]
impl Target for LocalDirTarget {
    async fn is_available(&mut self, log: &ScopedLogger<'_>) -> bool {
        let path = self.full_path();

        if self.settings.create_if_missing {
            if let Err(e) = std::fs::create_dir_all(&path) {
                log.error(
                    "load_data",
                    &format!("Cannot create directory {}: {e}", path.display()),
                    "",
                )
                .await;
                return false;
            }
        }

        let writable = path.is_dir()
            && std::fs::metadata(&path)
                .map(|meta| !meta.permissions().readonly())
                .unwrap_or(false);
        if writable {
            return true;
        }

        log.error(
            "load_data",
            &format!("Directory is not writable: {}", path.display()),
            "",
        )
        .await;
        false
    }

    async fn load_files(
        &mut self,
        files: &[PathBuf],
        log: &ScopedLogger<'_>,
    ) -> Result<bool, ConnectorError> {
        if self.settings.backup_files {
            backup_files(files, &self.full_path().join("backup"), log).await;
        }

        let now = Utc::now();
        let mut result = true;

        for file in files {
            let target = self
                .full_path()
                .join(self.settings.naming.target_file_name(file, now));

            if !self.guard_overwrite(&target, log).await {
                continue;
            }

            if *file == target {
                log.error(
                    "load_data",
                    &format!("Skip copying {}: source and target are the same file", file.display()),
                    "",
                )
                .await;
                continue;
            }

            match std::fs::copy(file, &target) {
                Ok(_) => {
                    log.info(
                        "load_data",
                        &format!("Successfully copied {} to {}", file.display(), target.display()),
                    )
                    .await;
                }
                Err(e) => {
                    log.error(
                        "load_data",
                        &format!(
                            "Failed to copy {} to {}: {e}",
                            file.display(),
                            target.display()
                        ),
                        "",
                    )
                    .await;
                    result = false; // Fail the format if any file fails.
                }
            }
        }

        Ok(result)
    }

    async fn load_string(
        &mut self,
        string: &str,
        log: &ScopedLogger<'_>,
    ) -> Result<bool, ConnectorError> {
        let Some(target) = self.fixed_target() else {
            return Err(ConnectorError::load_failed(
                self.name(),
                "a fixed filename is required to load the string format",
            ));
        };

        if !self.guard_overwrite(&target, log).await {
            return Ok(false);
        }

        std::fs::write(&target, string)?;
        log.info(
            "load_data",
            &format!("Wrote {} bytes to {}", string.len(), target.display()),
        )
        .await;
        Ok(true)
    }

    async fn load_records(
        &mut self,
        records: &[Record],
        log: &ScopedLogger<'_>,
    ) -> Result<bool, ConnectorError> {
        let Some(target) = self.fixed_target() else {
            return Err(ConnectorError::load_failed(
                self.name(),
                "a fixed filename is required to load the records format",
            ));
        };

        if !self.guard_overwrite(&target, log).await {
            return Ok(false);
        }

        let table = records_to_table(records);
        csv::write_table(&target, &table, ',')?;
        log.info(
            "load_data",
            &format!("Wrote {} records to {}", records.len(), target.display()),
        )
        .await;
        Ok(true)
    }

    async fn load_object(
        &mut self,
        object: &Value,
        log: &ScopedLogger<'_>,
    ) -> Result<bool, ConnectorError> {
        let Some(target) = self.fixed_target() else {
            return Err(ConnectorError::load_failed(
                self.name(),
                "a fixed filename is required to load the object format",
            ));
        };

        if !self.guard_overwrite(&target, log).await {
            return Ok(false);
        }

        std::fs::write(&target, serde_json::to_string_pretty(object)?)?;
        log.info("load_data", &format!("Wrote object to {}", target.display()))
            .await;
        Ok(true)
    }
}

/// Serialize records to a table using the first record's column order.
/// Columns missing from a later record serialize as empty fields.
fn records_to_table(records: &[Record]) -> csv::Table {
    let headers: Vec<String> = records
        .first()
        .map(|record| record.keys().cloned().collect())
        .unwrap_or_default();

    let rows = records
        .iter()
        .map(|record| {
            headers
                .iter()
                .map(|header| match record.get(header) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                })
                .collect()
        })
        .collect();

    csv::Table { headers, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Data, Format};
    use crate::database::test_database;
    use crate::logging::RunLogger;
    use serde_json::json;

    async fn logger() -> (crate::database::Database, RunLogger) {
        let db = test_database().await;
        let run_id = db.begin_run().await.unwrap();
        let logger = RunLogger::new(db.clone(), run_id, None);
        (db, logger)
    }

    fn target_in(dir: &std::path::Path, settings: LocalDirTargetSettings) -> LocalDirTarget {
        LocalDirTarget::new(settings, dir)
    }

    #[tokio::test]
    async fn copies_files_into_the_target_directory() {
        let root = tempfile::tempdir().unwrap();
        let incoming = tempfile::tempdir().unwrap();
        let file = incoming.path().join("users.csv");
        std::fs::write(&file, "name\nalice\n").unwrap();

        let (_db, logger) = logger().await;
        let log = logger.scoped(1, "Local directory", &[]);

        let mut target = target_in(
            root.path(),
            LocalDirTargetSettings {
                backup_files: false,
                ..LocalDirTargetSettings::default()
            },
        );
        let result = target.load(&Data::with_files(vec![file]), &log).await;

        assert!(result.get("files"));
        assert!(root.path().join("users.csv").is_file());
    }

    #[tokio::test]
    async fn overwrite_guard_skips_existing_files() {
        let root = tempfile::tempdir().unwrap();
        let incoming = tempfile::tempdir().unwrap();
        let file = incoming.path().join("users.csv");
        std::fs::write(&file, "new").unwrap();
        std::fs::write(root.path().join("users.csv"), "old").unwrap();

        let (db, logger) = logger().await;
        let log = logger.scoped(1, "Local directory", &[]);

        let mut target = target_in(
            root.path(),
            LocalDirTargetSettings {
                overwrite: false,
                backup_files: false,
                ..LocalDirTargetSettings::default()
            },
        );
        let ok = target.load_files(&[file], &log).await.unwrap();

        // Skipping is not a failure; the existing content is untouched.
        assert!(ok);
        assert_eq!(
            std::fs::read_to_string(root.path().join("users.csv")).unwrap(),
            "old"
        );
        let entries = db.logs_for_task(1).await.unwrap();
        assert!(entries.iter().any(|e| e.log_type == "WARNING"));
    }

    #[tokio::test]
    async fn copying_a_file_onto_itself_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("same.csv");
        std::fs::write(&file, "data").unwrap();

        let (db, logger) = logger().await;
        let log = logger.scoped(1, "Local directory", &[]);

        let mut target = target_in(
            root.path(),
            LocalDirTargetSettings {
                backup_files: false,
                ..LocalDirTargetSettings::default()
            },
        );
        target.load_files(&[file], &log).await.unwrap();

        let entries = db.logs_for_task(1).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.log_type == "ERROR" && e.info.contains("same file")));
    }

    #[tokio::test]
    async fn records_serialize_with_stable_column_order() {
        let root = tempfile::tempdir().unwrap();
        let (_db, logger) = logger().await;
        let log = logger.scoped(1, "Local directory", &[]);

        let mut record = Record::new();
        record.insert("name".to_string(), json!("alice"));
        record.insert("score".to_string(), json!(10));

        let mut target = target_in(
            root.path(),
            LocalDirTargetSettings {
                naming: FileNaming {
                    filename: "export.csv".to_string(),
                    ..FileNaming::default()
                },
                backup_files: false,
                ..LocalDirTargetSettings::default()
            },
        );
        let ok = target.load_records(&[record], &log).await.unwrap();
        assert!(ok);

        let written = std::fs::read_to_string(root.path().join("export.csv")).unwrap();
        assert_eq!(written, "name,score\nalice,10\n");
    }

    #[tokio::test]
    async fn string_format_requires_a_fixed_filename() {
        let root = tempfile::tempdir().unwrap();
        let (db, logger) = logger().await;
        let log = logger.scoped(1, "Local directory", &[]);

        let mut target = target_in(root.path(), LocalDirTargetSettings::default());
        let result = target
            .load(&Data::with_string("payload".to_string()), &log)
            .await;

        assert!(!result.get(Format::String.as_str()));
        let entries = db.logs_for_task(1).await.unwrap();
        assert!(entries.iter().any(|e| e.log_type == "ERROR"));
    }

    #[tokio::test]
    async fn unavailable_directory_yields_an_empty_result() {
        let root = tempfile::tempdir().unwrap();
        let (_db, logger) = logger().await;
        let log = logger.scoped(1, "Local directory", &[]);

        let mut target = target_in(
            root.path(),
            LocalDirTargetSettings {
                path: "does/not/exist".to_string(),
                ..LocalDirTargetSettings::default()
            },
        );
        let result = target
            .load(&Data::with_files(vec![PathBuf::from("x.csv")]), &log)
            .await;
        assert!(result.is_empty());
    }
}
