//! Extraction payload container and load outcome tracking
//!
//! A source produces a [`Data`] value holding up to four payload shapes; a
//! target reports which of those shapes it managed to load through a
//! [`LoadResult`]. Both sides iterate formats through the same fixed
//! declaration order so partial success stays attributable per format.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::errors::DataError;

/// One tabular row: column name → value, in column order.
pub type Record = serde_json::Map<String, Value>;

/// The payload shapes a [`Data`] container can hold, in declaration order.
pub const FORMATS: [Format; 4] = [
    Format::Files,
    Format::String,
    Format::Records,
    Format::Object,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Files,
    String,
    Records,
    Object,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::String => "string",
            Self::Records => "records",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multi-format extraction payload.
///
/// Every slot is optional; a slot that is present but empty still counts as
/// populated (an extraction that legitimately matched zero files is different
/// from one that never produced a file list).
#[derive(Debug, Clone, Default)]
pub struct Data {
    files: Option<Vec<PathBuf>>,
    string: Option<String>,
    records: Option<Vec<Record>>,
    object: Option<Value>,
}

impl Data {
    pub fn new(
        files: Option<Vec<PathBuf>>,
        string: Option<String>,
        records: Option<Vec<Record>>,
        object: Option<Value>,
    ) -> Self {
        Self {
            files,
            string,
            records,
            object,
        }
    }

    pub fn with_files(files: Vec<PathBuf>) -> Self {
        Self {
            files: Some(files),
            ..Self::default()
        }
    }

    pub fn with_string(string: String) -> Self {
        Self {
            string: Some(string),
            ..Self::default()
        }
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: Some(records),
            ..Self::default()
        }
    }

    pub fn with_object(object: Value) -> Self {
        Self {
            object: Some(object),
            ..Self::default()
        }
    }

    /// The populated formats, in declaration order.
    pub fn supported_formats(&self) -> Vec<Format> {
        FORMATS
            .iter()
            .copied()
            .filter(|format| self.holds(*format))
            .collect()
    }

    /// Whether the slot for `format` is populated (even if empty).
    pub fn holds(&self, format: Format) -> bool {
        match format {
            Format::Files => self.files.is_some(),
            Format::String => self.string.is_some(),
            Format::Records => self.records.is_some(),
            Format::Object => self.object.is_some(),
        }
    }

    /// Whether the slot for `format` is populated but carries no payload.
    pub fn is_empty(&self, format: Format) -> bool {
        match format {
            Format::Files => self.files.as_ref().is_some_and(|f| f.is_empty()),
            Format::String => self.string.as_ref().is_some_and(|s| s.is_empty()),
            Format::Records => self.records.as_ref().is_some_and(|r| r.is_empty()),
            Format::Object => self.object.as_ref().is_some_and(|o| o.is_null()),
        }
    }

    pub fn files(&self) -> Result<&[PathBuf], DataError> {
        self.files.as_deref().ok_or_else(|| DataError::NotSupported {
            format: Format::Files.as_str().to_string(),
        })
    }

    pub fn string(&self) -> Result<&str, DataError> {
        self.string.as_deref().ok_or_else(|| DataError::NotSupported {
            format: Format::String.as_str().to_string(),
        })
    }

    pub fn records(&self) -> Result<&[Record], DataError> {
        self.records
            .as_deref()
            .ok_or_else(|| DataError::NotSupported {
                format: Format::Records.as_str().to_string(),
            })
    }

    pub fn object(&self) -> Result<&Value, DataError> {
        self.object.as_ref().ok_or_else(|| DataError::NotSupported {
            format: Format::Object.as_str().to_string(),
        })
    }
}

/// Per-format load outcome map produced by a target.
///
/// Formats are recorded incrementally as the target works through
/// [`Data::supported_formats`]; a format that was never attempted reads as
/// `false` so callers can iterate uniformly without existence checks.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    results: HashMap<String, bool>,
}

impl LoadResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for a format.
    ///
    /// An empty format name is a coding error on the caller's side and is
    /// rejected rather than stored.
    pub fn set(&mut self, format: &str, ok: bool) -> Result<(), DataError> {
        if format.is_empty() {
            return Err(DataError::InvalidFormatName);
        }
        self.results.insert(format.to_string(), ok);
        Ok(())
    }

    /// Record the outcome for a known format.
    ///
    /// Infallible counterpart of [`LoadResult::set`] for the fixed format
    /// enum, whose names are non-empty by construction.
    pub fn record(&mut self, format: Format, ok: bool) {
        self.results.insert(format.as_str().to_string(), ok);
    }

    /// Outcome for a format; unknown or unset formats read as `false`.
    pub fn get(&self, format: &str) -> bool {
        self.results.get(format).copied().unwrap_or(false)
    }

    /// Whether no format was attempted at all.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether at least one format was attempted and every attempt succeeded.
    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.results.values().all(|ok| *ok)
    }

    /// Number of formats that loaded successfully.
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|ok| **ok).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.results.iter().map(|(format, ok)| (format.as_str(), *ok))
    }
}
