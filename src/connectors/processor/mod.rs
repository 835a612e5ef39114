//! Processor connector variants
//!
//! Processors sit between a source and a target. The transforming variants
//! share one file pipeline: parse each extracted file as header-keyed
//! delimited rows, apply a row transform, and re-serialize into a private
//! working directory. A file that cannot be parsed, normalizes to empty
//! output, or whose rewritten path already exists is skipped with a log
//! entry; the remaining files keep processing.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::csv;
use crate::errors::ConnectorError;
use crate::logging::ScopedLogger;

pub mod add_time_column;
pub mod lowercase;
pub mod passthrough;

pub use add_time_column::AddTimeColumnProcessor;
pub use lowercase::LowercaseProcessor;
pub use passthrough::PassthroughProcessor;

use super::ConnectorRegistry;

/// Register every built-in processor variant.
pub fn register_builtins(registry: &mut ConnectorRegistry) {
    registry.register_processor(
        passthrough::VARIANT,
        Box::new(|_ctx, envelope| Ok(Box::new(PassthroughProcessor::from_envelope(envelope)?))),
    );
    registry.register_processor(
        lowercase::VARIANT,
        Box::new(|ctx, envelope| Ok(Box::new(LowercaseProcessor::from_envelope(ctx, envelope)?))),
    );
    registry.register_processor(
        add_time_column::VARIANT,
        Box::new(|ctx, envelope| {
            Ok(Box::new(AddTimeColumnProcessor::from_envelope(ctx, envelope)?))
        }),
    );
}

/// A fresh working directory for one processing pass.
pub(crate) fn work_dir_for(scratch_root: &Path, variant: &str) -> PathBuf {
    scratch_root
        .join(variant)
        .join(Utc::now().format("%Y%m%d%H%M%S").to_string())
}

enum RewriteOutcome {
    Written(PathBuf),
    SkippedEmpty,
    SkippedExists(PathBuf),
}

fn rewrite_one(
    file: &Path,
    work_dir: &Path,
    delimiter: char,
    transform: &(dyn Fn(csv::Table) -> csv::Table + Send + Sync),
) -> Result<RewriteOutcome, ConnectorError> {
    let table = csv::read_table(file, delimiter)?;
    let rewritten = transform(table);

    if rewritten.is_empty() {
        return Ok(RewriteOutcome::SkippedEmpty);
    }

    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let target = work_dir.join(name);

    if target.exists() {
        return Ok(RewriteOutcome::SkippedExists(target));
    }

    std::fs::create_dir_all(work_dir)?;
    csv::write_table(&target, &rewritten, delimiter)?;
    Ok(RewriteOutcome::Written(target))
}

/// Rewrite a batch of files, skipping failures file by file.
pub(crate) async fn rewrite_files(
    files: &[PathBuf],
    work_dir: &Path,
    delimiter: char,
    log: &ScopedLogger<'_>,
    transform: &(dyn Fn(csv::Table) -> csv::Table + Send + Sync),
) -> Vec<PathBuf> {
    let mut rewritten = Vec::new();

    for file in files {
        match rewrite_one(file, work_dir, delimiter, transform) {
            Ok(RewriteOutcome::Written(target)) => {
                log.info(
                    "process",
                    &format!(
                        "Successfully processed {} to {}",
                        file.display(),
                        target.display()
                    ),
                )
                .await;
                rewritten.push(target);
            }
            Ok(RewriteOutcome::SkippedEmpty) => {
                log.warning(
                    "process",
                    &format!("Skip processing {}: empty file", file.display()),
                )
                .await;
            }
            Ok(RewriteOutcome::SkippedExists(target)) => {
                log.warning(
                    "process",
                    &format!(
                        "Skip processing {}: {} already exists",
                        file.display(),
                        target.display()
                    ),
                )
                .await;
            }
            Err(e) => {
                log.error(
                    "process",
                    &format!("Failed processing {}: {e}", file.display()),
                    &format!("{e:?}"),
                )
                .await;
            }
        }
    }

    rewritten
}
