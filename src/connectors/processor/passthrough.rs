//! Pass-through processor: hands the extracted payload to the target as-is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connectors::settings::{self, SettingsEnvelope};
use crate::connectors::{extract_from, load_into, Connector, Processor, Source, Target};
use crate::errors::ConnectorError;
use crate::logging::RunLogger;
use crate::models::SubmittedSettings;

pub const VARIANT: &str = "passthrough";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PassthroughSettings {
    pub notify_emails: Vec<String>,
}

pub struct PassthroughProcessor {
    settings: PassthroughSettings,
}

impl PassthroughProcessor {
    pub fn new(settings: PassthroughSettings) -> Self {
        Self { settings }
    }

    pub fn from_envelope(envelope: &SettingsEnvelope) -> Result<Self, ConnectorError> {
        Ok(Self::new(envelope.unpack(VARIANT)?))
    }
}

impl Connector for PassthroughProcessor {
    fn variant_id(&self) -> &'static str {
        VARIANT
    }

    fn name(&self) -> &str {
        "Default processor"
    }

    fn settings_value(&self) -> Result<Value, ConnectorError> {
        Ok(serde_json::to_value(&self.settings)?)
    }

    fn apply_submitted(&mut self, submitted: &SubmittedSettings) -> Result<(), ConnectorError> {
        self.settings = settings::apply_overrides(&self.settings, submitted)?;
        Ok(())
    }

    fn notify_emails(&self) -> &[String] {
        &self.settings.notify_emails
    }
}

#[async_trait]
impl Processor for PassthroughProcessor {
    async fn process(
        &mut self,
        source: &mut dyn Source,
        target: &mut dyn Target,
        logger: &RunLogger,
        task_id: i64,
    ) -> Result<bool, ConnectorError> {
        let data = extract_from(source, logger, task_id).await?;

        if data.supported_formats().is_empty() {
            let log = logger.scoped(task_id, self.name(), &self.settings.notify_emails);
            log.warning("process", "No data to process").await;
        }

        // Loaded regardless of emptiness: the target decides per format.
        load_into(target, &data, logger, task_id).await;
        Ok(true)
    }
}
