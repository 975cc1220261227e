use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registry::TaskDescriptor;

/// Read-only execution context handed to every task instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskContext {
    pub firmware_path: PathBuf,
    pub log_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    #[serde(default)]
    pub verbose: bool,
    /// Internal worker budget for this task.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
}

fn default_max_threads() -> usize {
    1
}

impl TaskContext {
    /// Narrow the run-wide context to one task: the thread budget becomes the
    /// smaller of the descriptor hint and the run limit.
    pub fn for_task(&self, descriptor: &TaskDescriptor, timeout_secs: Option<u64>) -> Self {
        let mut ctx = self.clone();
        ctx.max_threads = descriptor.max_workers.max(1).min(self.max_threads.max(1));
        ctx.timeout_secs = timeout_secs;
        ctx
    }

    /// Per-task scratch directory under `temp_dir`. `None` unless `temp_dir`
    /// is absolute, so an unset scratch root never resolves against the
    /// working directory.
    pub fn task_temp_dir(&self, task_name: &str) -> Option<PathBuf> {
        self.temp_dir
            .is_absolute()
            .then(|| self.temp_dir.join(task_name.to_ascii_lowercase()))
    }

    pub fn flag(&self, key: &str) -> Option<&str> {
        self.flags.get(key).map(String::as_str)
    }

    pub fn firmware(&self) -> &Path {
        &self.firmware_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Category, TaskDescriptor};
    use crate::task::TaskMetadata;

    #[test]
    fn for_task_caps_thread_budget() {
        let ctx = TaskContext {
            max_threads: 4,
            temp_dir: PathBuf::from("/tmp/run"),
            ..TaskContext::default()
        };
        let wide = TaskDescriptor::from_metadata(
            TaskMetadata::new("S20_scan").max_workers(16),
            Category::SecurityAnalysis,
            "",
        );
        let narrow = TaskDescriptor::from_metadata(
            TaskMetadata::new("S21_scan").max_workers(2),
            Category::SecurityAnalysis,
            "",
        );

        assert_eq!(ctx.for_task(&wide, Some(30)).max_threads, 4);
        assert_eq!(ctx.for_task(&narrow, None).max_threads, 2);
        assert_eq!(ctx.for_task(&wide, Some(30)).timeout_secs, Some(30));
        assert_eq!(
            ctx.task_temp_dir("S20_Scan"),
            Some(PathBuf::from("/tmp/run/s20_scan"))
        );
    }

    #[test]
    fn no_scratch_dir_without_an_absolute_root() {
        assert_eq!(TaskContext::default().task_temp_dir("S77_scan"), None);
        let relative = TaskContext {
            temp_dir: PathBuf::from("logs/tmp"),
            ..TaskContext::default()
        };
        assert_eq!(relative.task_temp_dir("S77_scan"), None);
    }
}
