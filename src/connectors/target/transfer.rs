//! Remote transfer target: pushes files to an sftp endpoint through the
//! injected transfer client.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{backup_files, FileNaming};
use crate::connectors::settings::{self, SettingsEnvelope};
use crate::connectors::{BuildContext, Connector, Target};
use crate::errors::ConnectorError;
use crate::logging::ScopedLogger;
use crate::models::SubmittedSettings;
use crate::transfer::{SharedClientFactory, TransferEndpoint};

pub const VARIANT: &str = "sftp";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferTargetSettings {
    #[serde(flatten)]
    pub endpoint: TransferEndpoint,
    pub directory: String,
    #[serde(flatten)]
    pub naming: FileNaming,
    pub overwrite: bool,
    pub backup_files: bool,
    pub notify_emails: Vec<String>,
}

impl Default for TransferTargetSettings {
    fn default() -> Self {
        Self {
            endpoint: TransferEndpoint::default(),
            directory: String::new(),
            naming: FileNaming::default(),
            overwrite: true,
            backup_files: true,
            notify_emails: Vec::new(),
        }
    }
}

pub struct TransferTarget {
    settings: TransferTargetSettings,
    clients: SharedClientFactory,
    scratch_dir: PathBuf,
}

impl TransferTarget {
    pub fn new(
        settings: TransferTargetSettings,
        clients: SharedClientFactory,
        scratch_root: &std::path::Path,
    ) -> Self {
        Self {
            settings,
            clients,
            scratch_dir: scratch_root.join("sftp_target"),
        }
    }

    pub fn from_envelope(
        ctx: &BuildContext,
        envelope: &SettingsEnvelope,
    ) -> Result<Self, ConnectorError> {
        Ok(Self::new(
            envelope.unpack(VARIANT)?,
            ctx.transfer_clients.clone(),
            &ctx.scratch_root,
        ))
    }

    fn remote_path(&self, file_name: &str) -> String {
        let dir = self.settings.directory.trim_end_matches('/');
        if dir.is_empty() {
            file_name.to_string()
        } else {
            format!("{dir}/{file_name}")
        }
    }
}

impl Connector for TransferTarget {
    fn variant_id(&self) -> &'static str {
        VARIANT
    }

    fn name(&self) -> &str {
        "SFTP"
    }

    fn settings_value(&self) -> Result<Value, ConnectorError> {
        Ok(serde_json::to_value(&self.settings)?)
    }

    fn apply_submitted(&mut self, submitted: &SubmittedSettings) -> Result<(), ConnectorError> {
        self.settings = settings::apply_overrides(&self.settings, submitted)?;
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ConnectorError> {
        if self.settings.endpoint.host.is_empty() {
            return Err(ConnectorError::invalid_settings(
                "host",
                "a transfer host is required",
            ));
        }
        if self.settings.endpoint.port == 0 {
            return Err(ConnectorError::invalid_settings("port", "port cannot be 0"));
        }
        Ok(())
    }

    fn notify_emails(&self) -> &[String] {
        &self.settings.notify_emails
    }
}

#[async_trait]
impl Target for TransferTarget {
    async fn is_available(&mut self, log: &ScopedLogger<'_>) -> bool {
        let mut client = self.clients.create(&self.settings.endpoint);
        match client.connect().await {
            Ok(()) => true,
            Err(e) => {
                log.error("connect", &format!("Connection failed: {e}"), "")
                    .await;
                false
            }
        }
    }

    async fn load_files(
        &mut self,
        files: &[PathBuf],
        log: &ScopedLogger<'_>,
    ) -> Result<bool, ConnectorError> {
        if self.settings.backup_files {
            backup_files(files, &self.scratch_dir.join("backup"), log).await;
        }

        let mut client = self.clients.create(&self.settings.endpoint);
        let existing = if self.settings.overwrite {
            Vec::new()
        } else {
            client.list(&self.settings.directory).await.unwrap_or_default()
        };

        let now = Utc::now();
        let mut result = true;

        for file in files {
            let name = self.settings.naming.target_file_name(file, now);
            let remote = self.remote_path(&name);

            if !self.settings.overwrite && existing.iter().any(|e| *e == name) {
                log.warning(
                    "load_data",
                    &format!("Skip copying {}: {remote} exists and overwriting is disabled", file.display()),
                )
                .await;
                continue;
            }

            match client.push(file, &remote).await {
                Ok(()) => {
                    log.info(
                        "load_data",
                        &format!("Successfully copied {} to {remote}", file.display()),
                    )
                    .await;
                }
                Err(e) => {
                    log.error(
                        "load_data",
                        &format!("Failed to copy {} to {remote}: {e}", file.display()),
                        "",
                    )
                    .await;
                    result = false; // Fail the format if any file fails.
                }
            }
        }

        Ok(result)
    }
}
