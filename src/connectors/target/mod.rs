//! Target connector variants

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logging::ScopedLogger;

pub mod local_dir;
pub mod transfer;

pub use local_dir::LocalDirTarget;
pub use transfer::TransferTarget;

use super::ConnectorRegistry;

/// Timestamp suffix format for templated file names.
const FILE_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Register every built-in target variant.
pub fn register_builtins(registry: &mut ConnectorRegistry) {
    registry.register_target(
        local_dir::VARIANT,
        Box::new(|ctx, envelope| Ok(Box::new(LocalDirTarget::from_envelope(ctx, envelope)?))),
    );
    registry.register_target(
        transfer::VARIANT,
        Box::new(|ctx, envelope| Ok(Box::new(TransferTarget::from_envelope(ctx, envelope)?))),
    );
}

/// File naming shared by targets: a fixed name or the original basename,
/// optionally suffixed with a formatted timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct FileNaming {
    /// Fixed target file name; empty keeps the source file's basename.
    pub filename: String,
    /// Append a formatted timestamp to the name.
    pub add_time: bool,
    /// Separator between the name and the timestamp.
    pub delimiter: String,
}

impl FileNaming {
    /// The target file name for one source file at a point in time.
    pub fn target_file_name(&self, source: &Path, now: DateTime<Utc>) -> String {
        let base = if self.filename.is_empty() {
            source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string())
        } else {
            self.filename.clone()
        };

        if self.add_time {
            format!("{base}{}{}", self.delimiter, now.format(FILE_DATE_FORMAT))
        } else {
            base
        }
    }

    /// The fixed name with the optional timestamp, for formats that have no
    /// source file to take a basename from.
    pub fn fixed_name(&self, now: DateTime<Utc>) -> Option<String> {
        if self.filename.is_empty() {
            return None;
        }
        Some(if self.add_time {
            format!(
                "{}{}{}",
                self.filename,
                self.delimiter,
                now.format(FILE_DATE_FORMAT)
            )
        } else {
            self.filename.clone()
        })
    }
}

/// Copy files into a timestamped backup directory before loading.
///
/// Backup problems are warnings: a failed backup never blocks the load.
pub(crate) async fn backup_files(files: &[PathBuf], backup_root: &Path, log: &ScopedLogger<'_>) {
    let backup_dir = backup_root.join(Utc::now().format(FILE_DATE_FORMAT).to_string());
    if let Err(e) = std::fs::create_dir_all(&backup_dir) {
        log.warning(
            "backup_files",
            &format!("Cannot create backup directory {}: {e}", backup_dir.display()),
        )
        .await;
        return;
    }

    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        if let Err(e) = std::fs::copy(file, backup_dir.join(name)) {
            log.warning(
                "backup_files",
                &format!("Failed to back up {}: {e}", file.display()),
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn original_basename_is_kept_by_default() {
        let naming = FileNaming::default();
        let now = Utc.with_ymd_and_hms(2014, 1, 10, 23, 0, 0).unwrap();
        assert_eq!(
            naming.target_file_name(Path::new("/incoming/users.csv"), now),
            "users.csv"
        );
    }

    #[test]
    fn fixed_name_overrides_basename() {
        let naming = FileNaming {
            filename: "latest.csv".to_string(),
            ..FileNaming::default()
        };
        let now = Utc.with_ymd_and_hms(2014, 1, 10, 23, 0, 0).unwrap();
        assert_eq!(
            naming.target_file_name(Path::new("/incoming/users.csv"), now),
            "latest.csv"
        );
    }

    #[test]
    fn timestamp_suffix_uses_the_delimiter() {
        let naming = FileNaming {
            filename: String::new(),
            add_time: true,
            delimiter: "_".to_string(),
        };
        let now = Utc.with_ymd_and_hms(2014, 1, 10, 23, 0, 0).unwrap();
        assert_eq!(
            naming.target_file_name(Path::new("users.csv"), now),
            "users.csv_20140110230000"
        );
    }

    #[test]
    fn fixed_name_is_absent_without_a_filename() {
        let now = Utc.with_ymd_and_hms(2014, 1, 10, 23, 0, 0).unwrap();
        assert_eq!(FileNaming::default().fixed_name(now), None);
        let naming = FileNaming {
            filename: "out.txt".to_string(),
            add_time: true,
            delimiter: "-".to_string(),
        };
        assert_eq!(
            naming.fixed_name(now),
            Some("out.txt-20140110230000".to_string())
        );
    }
}
