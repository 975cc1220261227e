//! Built-in analysis tasks, registered per category.

mod details;
mod extract;
mod firmware_check;
mod index;
mod prepare;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fwpipe_core::registry::Category;
use fwpipe_core::task::{PluginSource, StaticSource, TaskFault};

pub use details::{FirmwareDetails, DETAILS_FILE};
pub use extract::{BinwalkExtractor, UnblobExtractor, EXTERNAL_TOOLS};
pub use firmware_check::{guess_format, FirmwareCheck};
pub use index::{OutputIndex, INDEX_FILE};
pub use prepare::{find_root_dirs, PrepareAnalyzer, ROOT_DIRS_FILE};

/// One source per category. Empty categories still get a source so
/// discovery reports them.
pub fn builtin_sources() -> Vec<Box<dyn PluginSource>> {
    Category::ALL
        .into_iter()
        .map(|category| {
            let location = format!("builtin/{}", category.label());
            let source = StaticSource::new(category, location);
            let source = match category {
                Category::Extraction => source
                    .with(Arc::new(FirmwareCheck))
                    .with(Arc::new(BinwalkExtractor))
                    .with(Arc::new(UnblobExtractor))
                    .with(Arc::new(PrepareAnalyzer)),
                Category::SecurityAnalysis => source.with(Arc::new(FirmwareDetails)),
                Category::Reporting => source.with(Arc::new(OutputIndex)),
                _ => source,
            };
            Box::new(source) as Box<dyn PluginSource>
        })
        .collect()
}

/// Write a report file, creating its directory first.
pub(crate) fn write_report(path: &Path, lines: &[String]) -> Result<(), TaskFault> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(path, body)?;
    Ok(())
}

/// Every path below `root`, sorted. Unreadable entries are skipped.
pub(crate) fn walk(root: &Path) -> Vec<PathBuf> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&root.to_string_lossy()));
    let mut paths: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(entries) => entries.filter_map(Result::ok).collect(),
        Err(e) => {
            tracing::warn!("invalid glob pattern '{}': {}", pattern, e);
            Vec::new()
        }
    };
    paths.sort();
    paths
}
