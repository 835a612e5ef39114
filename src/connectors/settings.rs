//! Versioned connector settings envelopes and admin-form overrides
//!
//! Each connector variant owns a typed settings struct. For persistence the
//! struct is wrapped in a schema-tagged envelope (`variant`, `version`,
//! `settings`) so stored settings can be evolved per variant. The admin
//! surface submits flat key→string maps; overrides apply only to keys the
//! variant's settings already contain, with values coerced to the existing
//! field's type. Unknown keys are silently ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ConnectorError;
use crate::models::SubmittedSettings;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsEnvelope {
    #[serde(default)]
    pub variant: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub settings: Value,
}

impl SettingsEnvelope {
    /// Parse a stored envelope. An empty column deserializes to the default
    /// envelope, which unpacks to the variant's default settings.
    pub fn parse(raw: &str) -> Result<Self, ConnectorError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize a variant's settings into a stored envelope.
    pub fn pack<T: Serialize>(
        variant: &str,
        version: u32,
        settings: &T,
    ) -> Result<String, ConnectorError> {
        let envelope = Self {
            variant: variant.to_string(),
            version,
            settings: serde_json::to_value(settings)?,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Extract the typed settings for `expected_variant`.
    ///
    /// A missing payload yields the variant defaults; a payload tagged for a
    /// different variant is a configuration error, not silently coerced.
    pub fn unpack<T: DeserializeOwned + Default>(
        &self,
        expected_variant: &str,
    ) -> Result<T, ConnectorError> {
        if !self.variant.is_empty() && self.variant != expected_variant {
            return Err(ConnectorError::EnvelopeMismatch {
                expected: expected_variant.to_string(),
                found: self.variant.clone(),
            });
        }
        if self.settings.is_null() {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(self.settings.clone())?)
    }
}

/// Apply a flat submitted map on top of typed settings.
///
/// Only keys already present in the serialized settings are overwritten;
/// everything else is ignored. Submitted strings are coerced to the type the
/// existing field carries, keeping a malformed scalar from clobbering a
/// well-typed one.
pub fn apply_overrides<T: Serialize + DeserializeOwned>(
    current: &T,
    submitted: &SubmittedSettings,
) -> Result<T, ConnectorError> {
    let mut map = match serde_json::to_value(current)? {
        Value::Object(map) => map,
        _ => {
            return Err(ConnectorError::invalid_settings(
                "settings",
                "connector settings must serialize to an object",
            ))
        }
    };

    for (key, raw) in submitted {
        let Some(existing) = map.get(key) else {
            continue;
        };
        let coerced = coerce_like(existing, raw);
        map.insert(key.clone(), coerced);
    }

    Ok(serde_json::from_value(Value::Object(map))?)
}

fn coerce_like(existing: &Value, raw: &str) -> Value {
    match existing {
        Value::Bool(_) => Value::Bool(matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes"
        )),
        Value::Number(n) if n.is_i64() || n.is_u64() => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| existing.clone()),
        Value::Number(_) => raw
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| existing.clone()),
        Value::Array(_) => Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ),
        // Nested objects have no flat representation; leave them alone.
        Value::Object(_) => existing.clone(),
        Value::String(_) | Value::Null => Value::String(raw.to_string()),
    }
}
