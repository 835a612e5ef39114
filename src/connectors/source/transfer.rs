//! Remote transfer source: fetches matching files from an sftp endpoint.
//!
//! The wire protocol lives behind the injected [`TransferClient`]; this
//! connector owns the listing/filter/fetch loop and its partial-failure
//! policy (one bad file is a warning, not an aborted batch).

use std::path::PathBuf;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::connectors::settings::{self, SettingsEnvelope};
use crate::connectors::{BuildContext, Connector, Source};
use crate::data::Data;
use crate::errors::ConnectorError;
use crate::logging::ScopedLogger;
use crate::models::SubmittedSettings;
use crate::transfer::{SharedClientFactory, TransferEndpoint};

pub const VARIANT: &str = "sftp";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TransferSourceSettings {
    #[serde(flatten)]
    pub endpoint: TransferEndpoint,
    pub directory: String,
    pub file_regex: String,
    pub notify_emails: Vec<String>,
}

pub struct TransferSource {
    settings: TransferSourceSettings,
    clients: SharedClientFactory,
    scratch_dir: PathBuf,
}

impl TransferSource {
    pub fn new(
        settings: TransferSourceSettings,
        clients: SharedClientFactory,
        scratch_root: &std::path::Path,
    ) -> Self {
        Self {
            settings,
            clients,
            scratch_dir: scratch_root.join(VARIANT),
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

    fn matcher(&self) -> Result<Option<Regex>, ConnectorError> {
        if self.settings.file_regex.is_empty() {
            return Ok(None);
        }
        Regex::new(&self.settings.file_regex)
            .map(Some)
            .map_err(|e| ConnectorError::invalid_settings("file_regex", e.to_string()))
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

impl Connector for TransferSource {
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
        self.matcher()?;
        Ok(())
    }

    fn notify_emails(&self) -> &[String] {
        &self.settings.notify_emails
    }
}

#[async_trait]
impl Source for TransferSource {
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

    async fn extract(&mut self, log: &ScopedLogger<'_>) -> Result<Data, ConnectorError> {
        if !self.is_available(log).await {
            return Err(ConnectorError::unavailable(
                self.name(),
                format!("{} is unreachable", self.settings.endpoint.host),
            ));
        }

        let matcher = self.matcher()?;
        let mut client = self.clients.create(&self.settings.endpoint);
        let names = client.list(&self.settings.directory).await?;
        let matched: Vec<String> = names
            .into_iter()
            .filter(|name| {
                matcher
                    .as_ref()
                    .map(|regex| regex.is_match(name))
                    .unwrap_or(true)
            })
            .collect();

        log.info(
            "match_files",
            &format!(
                "{} files matched regex {}",
                matched.len(),
                self.settings.file_regex
            ),
        )
        .await;

        let fetch_dir = self.scratch_dir.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&fetch_dir)?;

        let mut fetched = Vec::new();
        for name in matched {
            let remote = self.remote_path(&name);
            let local = fetch_dir.join(&name);
            match client.fetch(&remote, &local).await {
                Ok(()) => {
                    log.info(
                        "copy_files",
                        &format!("Fetched {remote} to {}", local.display()),
                    )
                    .await;
                    fetched.push(local);
                }
                Err(e) => {
                    log.warning("copy_files", &format!("Failed to fetch {remote}: {e}"))
                        .await;
                }
            }
        }

        Ok(Data::with_files(fetched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_database;
    use crate::logging::RunLogger;
    use crate::transfer::mock::MockTransfer;
    use std::sync::Arc;

    fn source_over(mock: MockTransfer, dir: &str, regex: &str, scratch: &std::path::Path) -> TransferSource {
        TransferSource::new(
            TransferSourceSettings {
                endpoint: TransferEndpoint {
                    host: "files.example.com".to_string(),
                    ..TransferEndpoint::default()
                },
                directory: dir.to_string(),
                file_regex: regex.to_string(),
                notify_emails: vec![],
            },
            Arc::new(mock),
            scratch,
        )
    }

    #[tokio::test]
    async fn fetches_matching_files_and_skips_failures() {
        let scratch = tempfile::tempdir().unwrap();
        let mock = MockTransfer::reachable()
            .with_file("drop/a.csv", b"a")
            .with_file("drop/b.csv", b"b")
            .with_file("drop/skip.txt", b"s")
            .failing_on("drop/b.csv");

        let db = test_database().await;
        let run_id = db.begin_run().await.unwrap();
        let logger = RunLogger::new(db.clone(), run_id, None);
        let log = logger.scoped(1, "SFTP", &[]);

        let mut source = source_over(mock, "drop", r"\.csv$", scratch.path());
        let data = source.extract(&log).await.unwrap();

        let files = data.files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.csv"));

        let entries = db.logs_for_task(1).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.log_type == "WARNING" && e.info.contains("b.csv")));
    }

    #[tokio::test]
    async fn unreachable_endpoint_aborts_extraction() {
        let scratch = tempfile::tempdir().unwrap();
        let mock = MockTransfer::default(); // reachable = false

        let db = test_database().await;
        let run_id = db.begin_run().await.unwrap();
        let logger = RunLogger::new(db.clone(), run_id, None);
        let log = logger.scoped(1, "SFTP", &[]);

        let mut source = source_over(mock, "drop", "", scratch.path());
        assert!(matches!(
            source.extract(&log).await,
            Err(ConnectorError::Unavailable { .. })
        ));
    }

    #[test]
    fn validation_requires_a_host() {
        let source = TransferSource::new(
            TransferSourceSettings::default(),
            Arc::new(MockTransfer::default()),
            std::path::Path::new("/tmp"),
        );
        assert!(matches!(
            source.validate_settings(),
            Err(ConnectorError::InvalidSettings { .. })
        ));
    }
}
