//! URL source: downloads a single document over HTTP(S).

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::connectors::settings::{self, SettingsEnvelope};
use crate::connectors::{BuildContext, Connector, Source};
use crate::data::Data;
use crate::errors::ConnectorError;
use crate::logging::ScopedLogger;
use crate::models::SubmittedSettings;

pub const VARIANT: &str = "url";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct UrlSourceSettings {
    pub address: String,
    pub notify_emails: Vec<String>,
}

pub struct UrlSource {
    settings: UrlSourceSettings,
    scratch_dir: PathBuf,
    client: reqwest::Client,
}

impl UrlSource {
    pub fn new(settings: UrlSourceSettings, scratch_root: &std::path::Path) -> Self {
        Self {
            settings,
            scratch_dir: scratch_root.join(VARIANT),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_envelope(
        ctx: &BuildContext,
        envelope: &SettingsEnvelope,
    ) -> Result<Self, ConnectorError> {
        Ok(Self::new(envelope.unpack(VARIANT)?, &ctx.scratch_root))
    }

    fn parsed_address(&self) -> Result<Url, ConnectorError> {
        let url = Url::parse(&self.settings.address)
            .map_err(|e| ConnectorError::invalid_settings("address", e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConnectorError::invalid_settings(
                "address",
                format!("unsupported scheme {}", url.scheme()),
            ));
        }
        Ok(url)
    }

    /// Local file name for the fetched document, derived from the last path
    /// segment of the URL.
    fn local_file_name(url: &Url) -> String {
        url.path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("download")
            .to_string()
    }
}

impl Connector for UrlSource {
    fn variant_id(&self) -> &'static str {
        VARIANT
    }

    fn name(&self) -> &str {
        "URL"
    }

    fn settings_value(&self) -> Result<Value, ConnectorError> {
        Ok(serde_json::to_value(&self.settings)?)
    }

    fn apply_submitted(&mut self, submitted: &SubmittedSettings) -> Result<(), ConnectorError> {
        self.settings = settings::apply_overrides(&self.settings, submitted)?;
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ConnectorError> {
        self.parsed_address().map(|_| ())
    }

    fn notify_emails(&self) -> &[String] {
        &self.settings.notify_emails
    }
}

#[async_trait]
impl Source for UrlSource {
    async fn is_available(&mut self, log: &ScopedLogger<'_>) -> bool {
        let url = match self.parsed_address() {
            Ok(url) => url,
            Err(e) => {
                log.error("extract", &format!("URL is not valid: {e}"), "").await;
                return false;
            }
        };

        match self.client.head(url.clone()).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                log.error(
                    "extract",
                    &format!("URL is not reachable: {url} returned {}", response.status()),
                    "",
                )
                .await;
                false
            }
            Err(e) => {
                log.error("extract", &format!("URL is not reachable: {e}"), "")
                    .await;
                false
            }
        }
    }

    async fn extract(&mut self, log: &ScopedLogger<'_>) -> Result<Data, ConnectorError> {
        if !self.is_available(log).await {
            return Err(ConnectorError::unavailable(
                self.name(),
                format!("{} cannot be fetched", self.settings.address),
            ));
        }

        let url = self.parsed_address()?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::extract_failed(
                self.name(),
                format!("{url} returned {status}"),
            ));
        }
        let body = response.bytes().await?;

        let fetch_dir = self.scratch_dir.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&fetch_dir)?;
        let local = fetch_dir.join(Self::local_file_name(&url));
        std::fs::write(&local, &body)?;

        log.info(
            "copy_from_url",
            &format!("Completed copy {} to {}", url, local.display()),
        )
        .await;

        Ok(Data::with_files(vec![local]))
    }
}
