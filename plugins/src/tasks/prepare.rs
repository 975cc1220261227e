use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use fwpipe_core::task::{Task, TaskContext, TaskFault, TaskLogger, TaskMetadata, TaskPlugin};

use super::{walk, write_report};

pub const ROOT_DIRS_FILE: &str = "root_dirs.txt";

/// Directory names extractors give to unpacked filesystems.
const ROOT_NAMES: &[&str] = &["rootfs", "squashfs-root", "cpio-root", "jffs2-root", "ubifs-root"];
/// A directory holding `etc` and at least this many of these looks like a
/// Linux root.
const LINUX_MARKERS: &[&str] = &["bin", "sbin", "lib", "usr", "var"];
const MIN_MARKERS: usize = 2;

fn is_named_root(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| {
            ROOT_NAMES.contains(&name) || name.starts_with("squashfs-root") || name.ends_with("-root")
        })
        .unwrap_or(false)
}

fn looks_like_linux(path: &Path) -> bool {
    path.join("etc").is_dir()
        && LINUX_MARKERS
            .iter()
            .filter(|m| path.join(m).is_dir())
            .count()
            >= MIN_MARKERS
}

/// Root filesystems found below `search`: named extractor outputs first,
/// then anything with a Linux layout. Nested matches inside an already
/// found root are dropped.
pub fn find_root_dirs(search: &Path) -> Vec<PathBuf> {
    let mut candidates: BTreeSet<PathBuf> = BTreeSet::new();
    if looks_like_linux(search) {
        candidates.insert(search.to_path_buf());
    }
    for path in walk(search).into_iter().filter(|p| p.is_dir()) {
        if is_named_root(&path) || looks_like_linux(&path) {
            candidates.insert(path);
        }
    }

    let mut roots: Vec<PathBuf> = Vec::new();
    for candidate in candidates {
        if !roots.iter().any(|r| candidate.starts_with(r)) {
            roots.push(candidate);
        }
    }
    roots
}

pub struct PrepareAnalyzer;

impl TaskPlugin for PrepareAnalyzer {
    fn metadata(&self) -> TaskMetadata {
        TaskMetadata::new("P99_prepare_analyzer")
            .description("Locate extracted root filesystems")
            .sequential()
            .produces_output()
    }

    fn create(&self, ctx: &TaskContext, log: TaskLogger) -> Box<dyn Task> {
        Box::new(PrepareRun {
            ctx: ctx.clone(),
            log,
        })
    }
}

struct PrepareRun {
    ctx: TaskContext,
    log: TaskLogger,
}

impl Task for PrepareRun {
    fn run(&mut self) -> Result<i32, TaskFault> {
        let mut roots = Vec::new();
        if self.ctx.firmware_path.is_dir() {
            roots.extend(find_root_dirs(&self.ctx.firmware_path));
            if roots.is_empty() {
                roots.push(self.ctx.firmware_path.clone());
            }
        }
        if self.ctx.output_dir.is_dir() {
            roots.extend(find_root_dirs(&self.ctx.output_dir));
        }

        if roots.is_empty() {
            self.log.error(format!(
                "no root filesystem found under {}",
                self.ctx.output_dir.display()
            ));
            return Ok(1);
        }

        for root in &roots {
            self.log.info(format!("root filesystem: {}", root.display()));
        }
        let lines: Vec<String> = roots.iter().map(|r| r.display().to_string()).collect();
        write_report(&self.ctx.log_dir.join(ROOT_DIRS_FILE), &lines)?;
        self.log
            .success(format!("{} root filesystem(s) identified", roots.len()));
        Ok(0)
    }
}

/// Roots written by the prepare step, if any.
pub(crate) fn read_root_dirs(log_dir: &Path) -> Option<Vec<PathBuf>> {
    let body = fs::read_to_string(log_dir.join(ROOT_DIRS_FILE)).ok()?;
    Some(
        body.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwpipe_core::executor::{run_attempt, AttemptOutcome};
    use fwpipe_core::task::NullSink;
    use std::sync::Arc;

    fn mkdirs(base: &Path, dirs: &[&str]) {
        for d in dirs {
            fs::create_dir_all(base.join(d)).unwrap();
        }
    }

    #[test]
    fn named_and_layout_roots_are_found() {
        let out = tempfile::tempdir().unwrap();
        mkdirs(
            out.path(),
            &[
                "binwalk/_fw.bin.extracted/squashfs-root/etc",
                "binwalk/_fw.bin.extracted/squashfs-root/bin",
                "unblob/blob/etc",
                "unblob/blob/usr",
                "unblob/blob/lib",
                "unblob/notes/etc",
            ],
        );

        let roots = find_root_dirs(out.path());

        assert_eq!(
            roots,
            vec![
                out.path().join("binwalk/_fw.bin.extracted/squashfs-root"),
                out.path().join("unblob/blob"),
            ]
        );
    }

    #[test]
    fn writes_root_dirs_file() {
        let tmp = tempfile::tempdir().unwrap();
        mkdirs(tmp.path(), &["out/binwalk/x/rootfs/etc"]);
        let ctx = TaskContext {
            firmware_path: tmp.path().join("fw.bin"),
            output_dir: tmp.path().join("out"),
            log_dir: tmp.path().join("logs"),
            ..TaskContext::default()
        };
        let log = TaskLogger::new("P99_prepare_analyzer", Arc::new(NullSink));

        let outcome = run_attempt(&PrepareAnalyzer, &ctx, log);

        assert!(matches!(outcome, AttemptOutcome::Exited(0)));
        assert_eq!(
            read_root_dirs(&ctx.log_dir).unwrap(),
            vec![tmp.path().join("out/binwalk/x/rootfs")]
        );
    }

    #[test]
    fn nothing_found_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = TaskContext {
            firmware_path: tmp.path().join("fw.bin"),
            output_dir: tmp.path().join("out"),
            log_dir: tmp.path().join("logs"),
            ..TaskContext::default()
        };
        let log = TaskLogger::new("P99_prepare_analyzer", Arc::new(NullSink));

        let outcome = run_attempt(&PrepareAnalyzer, &ctx, log);

        assert!(matches!(outcome, AttemptOutcome::Exited(1)));
        assert!(read_root_dirs(&ctx.log_dir).is_none());
    }
}
