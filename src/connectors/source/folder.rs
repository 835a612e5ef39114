//! Local folder source: picks up files matching a pattern from a directory.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connectors::settings::{self, SettingsEnvelope};
use crate::connectors::{Connector, Source};
use crate::data::Data;
use crate::errors::ConnectorError;
use crate::logging::ScopedLogger;
use crate::models::SubmittedSettings;

pub const VARIANT: &str = "folder";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct FolderSourceSettings {
    pub folder: String,
    pub file_regex: String,
    pub notify_emails: Vec<String>,
}

pub struct FolderSource {
    settings: FolderSourceSettings,
}

impl FolderSource {
    pub fn new(settings: FolderSourceSettings) -> Self {
        Self { settings }
    }

    pub fn from_envelope(envelope: &SettingsEnvelope) -> Result<Self, ConnectorError> {
        Ok(Self::new(envelope.unpack(VARIANT)?))
    }

    fn matcher(&self) -> Result<Option<Regex>, ConnectorError> {
        if self.settings.file_regex.is_empty() {
            return Ok(None);
        }
        Regex::new(&self.settings.file_regex)
            .map(Some)
            .map_err(|e| ConnectorError::invalid_settings("file_regex", e.to_string()))
    }

    fn matching_files(&self) -> Result<Vec<std::path::PathBuf>, ConnectorError> {
        let matcher = self.matcher()?;
        let mut files = Vec::new();

        for entry in std::fs::read_dir(&self.settings.folder)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let matched = matcher
                .as_ref()
                .map(|regex| regex.is_match(&file_name))
                .unwrap_or(true);
            if matched {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }
}

impl Connector for FolderSource {
    fn variant_id(&self) -> &'static str {
        VARIANT
    }

    fn name(&self) -> &str {
        "Folder"
    }

    fn settings_value(&self) -> Result<Value, ConnectorError> {
        Ok(serde_json::to_value(&self.settings)?)
    }

    fn apply_submitted(&mut self, submitted: &SubmittedSettings) -> Result<(), ConnectorError> {
        self.settings = settings::apply_overrides(&self.settings, submitted)?;
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ConnectorError> {
        if self.settings.folder.is_empty() {
            return Err(ConnectorError::invalid_settings(
                "folder",
                "a source directory is required",
            ));
        }
        self.matcher()?;
        Ok(())
    }

    fn notify_emails(&self) -> &[String] {
        &self.settings.notify_emails
    }
}

#[async_trait]
impl Source for FolderSource {
    async fn is_available(&mut self, log: &ScopedLogger<'_>) -> bool {
        let path = std::path::Path::new(&self.settings.folder);
        if path.is_dir() && std::fs::read_dir(path).is_ok() {
            return true;
        }
        log.error(
            "extract",
            &format!("Folder is not readable: {}", self.settings.folder),
            "",
        )
        .await;
        false
    }

    async fn extract(&mut self, log: &ScopedLogger<'_>) -> Result<Data, ConnectorError> {
        if !self.is_available(log).await {
            return Err(ConnectorError::unavailable(
                self.name(),
                format!("{} is not a readable directory", self.settings.folder),
            ));
        }

        let files = self.matching_files()?;
        log.info(
            "match_files",
            &format!(
                "{} files matched regex {}",
                files.len(),
                self.settings.file_regex
            ),
        )
        .await;

        Ok(Data::with_files(files))
    }
}
