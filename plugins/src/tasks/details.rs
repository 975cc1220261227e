use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fwpipe_core::task::{Task, TaskContext, TaskFault, TaskLogger, TaskMetadata, TaskPlugin};

use super::prepare::read_root_dirs;
use super::{walk, write_report};

pub const DETAILS_FILE: &str = "firmware_details.txt";
const TOP_EXTENSIONS: usize = 10;

#[derive(Debug, Default, PartialEq)]
struct RootStats {
    files: usize,
    dirs: usize,
    symlinks: usize,
    executables: usize,
    bytes: u64,
    extensions: BTreeMap<String, usize>,
}

fn collect(root: &Path) -> RootStats {
    let mut stats = RootStats::default();
    for path in walk(root) {
        let Ok(meta) = path.symlink_metadata() else {
            continue;
        };
        let kind = meta.file_type();
        if kind.is_symlink() {
            stats.symlinks += 1;
        } else if kind.is_dir() {
            stats.dirs += 1;
        } else if kind.is_file() {
            stats.files += 1;
            stats.bytes += meta.len();
            if is_executable(&meta) {
                stats.executables += 1;
            }
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| "(none)".to_string());
            *stats.extensions.entry(ext).or_default() += 1;
        }
    }
    stats
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

/// Inventory of the identified root filesystems.
pub struct FirmwareDetails;

impl TaskPlugin for FirmwareDetails {
    fn metadata(&self) -> TaskMetadata {
        TaskMetadata::new("S05_firmware_details")
            .description("Count files in the extracted root filesystems")
    }

    fn create(&self, ctx: &TaskContext, log: TaskLogger) -> Box<dyn Task> {
        Box::new(DetailsRun {
            ctx: ctx.clone(),
            log,
            roots: Vec::new(),
        })
    }
}

struct DetailsRun {
    ctx: TaskContext,
    log: TaskLogger,
    roots: Vec<PathBuf>,
}

impl Task for DetailsRun {
    fn pre_run(&mut self) -> bool {
        match read_root_dirs(&self.ctx.log_dir) {
            Some(roots) if !roots.is_empty() => {
                self.roots = roots;
                true
            }
            _ => {
                self.log.warning("no root filesystems recorded, skipping");
                false
            }
        }
    }

    fn run(&mut self) -> Result<i32, TaskFault> {
        let mut lines = Vec::new();
        let mut total_files = 0;
        for root in &self.roots {
            if !root.is_dir() {
                self.log
                    .warning(format!("recorded root {} is gone", root.display()));
                continue;
            }
            let stats = collect(root);
            total_files += stats.files;
            self.log.info(format!(
                "{}: {} files, {} directories",
                root.display(),
                stats.files,
                stats.dirs
            ));

            lines.push(format!("[{}]", root.display()));
            lines.push(format!("files: {}", stats.files));
            lines.push(format!("directories: {}", stats.dirs));
            lines.push(format!("symlinks: {}", stats.symlinks));
            lines.push(format!("executables: {}", stats.executables));
            lines.push(format!("bytes: {}", stats.bytes));
            let mut by_count: Vec<_> = stats.extensions.into_iter().collect();
            by_count.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (ext, count) in by_count.into_iter().take(TOP_EXTENSIONS) {
                lines.push(format!("  {ext}: {count}"));
            }
            lines.push(String::new());
        }

        write_report(&self.ctx.log_dir.join(DETAILS_FILE), &lines)?;
        self.log
            .success(format!("{} files inventoried", total_files));
        Ok(0)
    }
}
