use std::path::Path;

use fwpipe_core::task::{Task, TaskContext, TaskFault, TaskLogger, TaskMetadata, TaskPlugin};

use super::{walk, write_report};

pub const INDEX_FILE: &str = "index.txt";

/// Writes `index.txt` into the log directory: one line per file in the log
/// and output directories, with its size.
pub struct OutputIndex;

impl TaskPlugin for OutputIndex {
    fn metadata(&self) -> TaskMetadata {
        TaskMetadata::new("F50_output_index")
            .description("Index every file the run produced")
            .sequential()
    }

    fn create(&self, ctx: &TaskContext, log: TaskLogger) -> Box<dyn Task> {
        Box::new(IndexRun {
            ctx: ctx.clone(),
            log,
        })
    }
}

struct IndexRun {
    ctx: TaskContext,
    log: TaskLogger,
}

fn index_lines(label: &str, root: &Path, skip: &Path) -> Vec<String> {
    walk(root)
        .into_iter()
        .filter(|p| p != skip)
        .filter_map(|p| {
            let meta = p.symlink_metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            let relative = p.strip_prefix(root).ok()?;
            Some(format!("{label}/{}\t{}", relative.display(), meta.len()))
        })
        .collect()
}

impl Task for IndexRun {
    fn run(&mut self) -> Result<i32, TaskFault> {
        let target = self.ctx.log_dir.join(INDEX_FILE);
        let mut lines = index_lines("log", &self.ctx.log_dir, &target);
        if self.ctx.output_dir != self.ctx.log_dir {
            lines.extend(index_lines("output", &self.ctx.output_dir, &target));
        }

        write_report(&target, &lines)?;
        self.log.success(format!(
            "indexed {} files into {}",
            lines.len(),
            target.display()
        ));
        Ok(0)
    }
}
