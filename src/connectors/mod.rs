//! Connector capability traits and the closed variant registry
//!
//! A task binds one connector per role: a [`Source`] that extracts a
//! [`Data`] payload, an optional transforming [`Processor`], and a
//! [`Target`] that loads the payload and reports a per-format
//! [`LoadResult`]. Concrete variants are registered under stable string ids
//! in a [`ConnectorRegistry`] populated at startup; looking up an id that
//! was never registered is a typed error, not a reflective class hunt.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::data::{Data, Format, LoadResult, Record};
use crate::errors::ConnectorError;
use crate::logging::{RunLogger, ScopedLogger};
use crate::models::SubmittedSettings;
use crate::transfer::SharedClientFactory;

pub mod processor;
pub mod settings;
pub mod source;
pub mod target;

pub use settings::SettingsEnvelope;

/// Behaviour shared by every connector regardless of role.
pub trait Connector: Send {
    /// Stable registry id of this variant.
    fn variant_id(&self) -> &'static str;

    /// Human-readable connector name used in log entries.
    fn name(&self) -> &str;

    /// Current typed settings as a JSON value, for persistence.
    fn settings_value(&self) -> Result<Value, ConnectorError>;

    /// Settings schema version written into the envelope.
    fn settings_version(&self) -> u32 {
        1
    }

    /// Apply a flat key→string map submitted by the configuration surface.
    fn apply_submitted(&mut self, submitted: &SubmittedSettings) -> Result<(), ConnectorError>;

    /// Validate the current settings (non-empty host, valid regex, safe
    /// SQL, …). Called on save, before anything is persisted.
    fn validate_settings(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    /// Addresses to alert when this connector logs an ERROR.
    fn notify_emails(&self) -> &[String] {
        &[]
    }

    /// Serialize the settings into a stored envelope.
    fn settings_envelope(&self) -> Result<String, ConnectorError> {
        SettingsEnvelope::pack(
            self.variant_id(),
            self.settings_version(),
            &self.settings_value()?,
        )
    }
}

/// Extraction capability.
#[async_trait]
pub trait Source: Connector {
    /// Whether the backing resource can currently be read.
    async fn is_available(&mut self, log: &ScopedLogger<'_>) -> bool;

    /// Extract a payload, failing with `Unavailable` when the backing
    /// resource cannot be reached.
    async fn extract(&mut self, log: &ScopedLogger<'_>) -> Result<Data, ConnectorError>;
}

/// Load capability with per-format dispatch.
///
/// Variants implement the per-format handlers they support and inherit the
/// dispatch in [`Target::load`]: every supported format of the payload is
/// attempted independently, failures are logged and recorded as `false`,
/// and one failing format never aborts the remaining ones.
#[async_trait]
pub trait Target: Connector {
    /// Whether the backing resource can currently be written.
    async fn is_available(&mut self, log: &ScopedLogger<'_>) -> bool;

    async fn load_files(
        &mut self,
        _files: &[PathBuf],
        _log: &ScopedLogger<'_>,
    ) -> Result<bool, ConnectorError> {
        Err(ConnectorError::unsupported_format(
            self.name(),
            Format::Files.as_str(),
        ))
    }

    async fn load_string(
        &mut self,
        _string: &str,
        _log: &ScopedLogger<'_>,
    ) -> Result<bool, ConnectorError> {
        Err(ConnectorError::unsupported_format(
            self.name(),
            Format::String.as_str(),
        ))
    }

    async fn load_records(
        &mut self,
        _records: &[Record],
        _log: &ScopedLogger<'_>,
    ) -> Result<bool, ConnectorError> {
        Err(ConnectorError::unsupported_format(
            self.name(),
            Format::Records.as_str(),
        ))
    }

    async fn load_object(
        &mut self,
        _object: &Value,
        _log: &ScopedLogger<'_>,
    ) -> Result<bool, ConnectorError> {
        Err(ConnectorError::unsupported_format(
            self.name(),
            Format::Object.as_str(),
        ))
    }

    /// Load a payload, attempting every supported format independently.
    async fn load(&mut self, data: &Data, log: &ScopedLogger<'_>) -> LoadResult {
        let mut result = LoadResult::new();

        if !self.is_available(log).await {
            return result;
        }

        for format in data.supported_formats() {
            result.record(format, false);

            if data.is_empty(format) {
                log.warning(
                    "load_data",
                    &format!("Nothing to load: the {format} payload is empty"),
                )
                .await;
                continue;
            }

            let outcome = match format {
                Format::Files => match data.files() {
                    Ok(files) => self.load_files(files, log).await,
                    Err(e) => Err(e.into()),
                },
                Format::String => match data.string() {
                    Ok(string) => self.load_string(string, log).await,
                    Err(e) => Err(e.into()),
                },
                Format::Records => match data.records() {
                    Ok(records) => self.load_records(records, log).await,
                    Err(e) => Err(e.into()),
                },
                Format::Object => match data.object() {
                    Ok(object) => self.load_object(object, log).await,
                    Err(e) => Err(e.into()),
                },
            };

            match outcome {
                Ok(ok) => result.record(format, ok),
                Err(ConnectorError::UnsupportedFormat { connector, format }) => {
                    log.warning(
                        "load_data",
                        &format!("{connector} has no handler for the {format} format"),
                    )
                    .await;
                }
                Err(e) => {
                    log.error(
                        "load_data",
                        &format!("Loading the {format} format failed: {e}"),
                        &format!("{e:?}"),
                    )
                    .await;
                }
            }
        }

        result
    }
}

/// Transform-and-forward capability sitting between a source and a target.
#[async_trait]
pub trait Processor: Connector {
    async fn process(
        &mut self,
        source: &mut dyn Source,
        target: &mut dyn Target,
        logger: &RunLogger,
        task_id: i64,
    ) -> Result<bool, ConnectorError>;
}

/// Extract from a source under a logging scope carrying the source's own
/// element name and notification addresses.
pub async fn extract_from(
    source: &mut dyn Source,
    logger: &RunLogger,
    task_id: i64,
) -> Result<Data, ConnectorError> {
    let element = source.name().to_string();
    let notify = source.notify_emails().to_vec();
    let log = logger.scoped(task_id, &element, &notify);
    source.extract(&log).await
}

/// Load into a target under a logging scope carrying the target's own
/// element name and notification addresses.
pub async fn load_into(
    target: &mut dyn Target,
    data: &Data,
    logger: &RunLogger,
    task_id: i64,
) -> LoadResult {
    let element = target.name().to_string();
    let notify = target.notify_emails().to_vec();
    let log = logger.scoped(task_id, &element, &notify);
    target.load(data, &log).await
}

/// Connector roles, used in error messages and registry lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorRole {
    Source,
    Target,
    Processor,
}

impl ConnectorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
            Self::Processor => "processor",
        }
    }
}

impl std::fmt::Display for ConnectorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a connector factory may need at construction time.
#[derive(Clone)]
pub struct BuildContext {
    /// Root for connector-type-owned scratch directories.
    pub scratch_root: PathBuf,
    /// Root the local directory target resolves relative paths against.
    pub data_root: PathBuf,
    /// Pool the database source queries.
    pub pool: SqlitePool,
    /// Factory for remote transfer clients.
    pub transfer_clients: SharedClientFactory,
    /// Calendar for query time-window substitution.
    pub timezone: chrono_tz::Tz,
    /// Substituted for %%USERID%% in database source queries.
    pub query_user_id: i64,
}


type SourceFactory =
    Box<dyn Fn(&BuildContext, &SettingsEnvelope) -> Result<Box<dyn Source>, ConnectorError> + Send + Sync>;
type TargetFactory =
    Box<dyn Fn(&BuildContext, &SettingsEnvelope) -> Result<Box<dyn Target>, ConnectorError> + Send + Sync>;
type ProcessorFactory = Box<
    dyn Fn(&BuildContext, &SettingsEnvelope) -> Result<Box<dyn Processor>, ConnectorError>
        + Send
        + Sync,
>;

/// Closed mapping from `(role, variant id)` to a construction function.
pub struct ConnectorRegistry {
    ctx: BuildContext,
    sources: BTreeMap<&'static str, SourceFactory>,
    targets: BTreeMap<&'static str, TargetFactory>,
    processors: BTreeMap<&'static str, ProcessorFactory>,
}

impl ConnectorRegistry {
    /// An empty registry; variants must be registered before use.
    pub fn new(ctx: BuildContext) -> Self {
        Self {
            ctx,
            sources: BTreeMap::new(),
            targets: BTreeMap::new(),
            processors: BTreeMap::new(),
        }
    }

    /// A registry with every built-in connector variant registered.
    pub fn with_builtins(ctx: BuildContext) -> Self {
        let mut registry = Self::new(ctx);
        source::register_builtins(&mut registry);
        target::register_builtins(&mut registry);
        processor::register_builtins(&mut registry);
        registry
    }

    pub fn register_source(&mut self, variant: &'static str, factory: SourceFactory) {
        self.sources.insert(variant, factory);
    }

    pub fn register_target(&mut self, variant: &'static str, factory: TargetFactory) {
        self.targets.insert(variant, factory);
    }

    pub fn register_processor(&mut self, variant: &'static str, factory: ProcessorFactory) {
        self.processors.insert(variant, factory);
    }

    pub fn create_source(
        &self,
        variant: &str,
        raw_settings: &str,
    ) -> Result<Box<dyn Source>, ConnectorError> {
        let envelope = SettingsEnvelope::parse(raw_settings)?;
        let factory = self.sources.get(variant).ok_or_else(|| {
            ConnectorError::unknown_variant(ConnectorRole::Source.as_str(), variant)
        })?;
        factory(&self.ctx, &envelope)
    }

    pub fn create_target(
        &self,
        variant: &str,
        raw_settings: &str,
    ) -> Result<Box<dyn Target>, ConnectorError> {
        let envelope = SettingsEnvelope::parse(raw_settings)?;
        let factory = self.targets.get(variant).ok_or_else(|| {
            ConnectorError::unknown_variant(ConnectorRole::Target.as_str(), variant)
        })?;
        factory(&self.ctx, &envelope)
    }

    pub fn create_processor(
        &self,
        variant: &str,
        raw_settings: &str,
    ) -> Result<Box<dyn Processor>, ConnectorError> {
        let envelope = SettingsEnvelope::parse(raw_settings)?;
        let factory = self.processors.get(variant).ok_or_else(|| {
            ConnectorError::unknown_variant(ConnectorRole::Processor.as_str(), variant)
        })?;
        factory(&self.ctx, &envelope)
    }

    pub fn source_variants(&self) -> Vec<&'static str> {
        self.sources.keys().copied().collect()
    }

    pub fn target_variants(&self) -> Vec<&'static str> {
        self.targets.keys().copied().collect()
    }

    pub fn processor_variants(&self) -> Vec<&'static str> {
        self.processors.keys().copied().collect()
    }
}
