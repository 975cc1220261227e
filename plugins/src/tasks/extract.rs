use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use fwpipe_core::task::{Task, TaskContext, TaskFault, TaskLogger, TaskMetadata, TaskPlugin};

/// Exit code reported when the external tool is not installed.
pub const TOOL_MISSING_EXIT_CODE: i32 = 127;

/// An external extraction tool and how to call it.
struct Tool {
    binary: &'static str,
    args: fn(firmware: &Path, out_dir: &Path) -> Vec<OsString>,
}

const BINWALK: Tool = Tool {
    binary: "binwalk",
    args: |firmware, out_dir| {
        vec![
            "-e".into(),
            "-M".into(),
            "-C".into(),
            out_dir.into(),
            firmware.into(),
        ]
    },
};

const UNBLOB: Tool = Tool {
    binary: "unblob",
    args: |firmware, out_dir| vec!["--extract-dir".into(), out_dir.into(), firmware.into()],
};

/// External binary each extractor calls, by task name.
pub const EXTERNAL_TOOLS: [(&str, &str); 2] = [
    ("P50_binwalk_extractor", BINWALK.binary),
    ("P55_unblob_extractor", UNBLOB.binary),
];

/// Recursive extraction with binwalk. Falls back to unblob.
pub struct BinwalkExtractor;

/// Extraction with unblob. Disabled by default; it runs as the fallback of
/// the binwalk extractor.
pub struct UnblobExtractor;

impl TaskPlugin for BinwalkExtractor {
    fn metadata(&self) -> TaskMetadata {
        TaskMetadata::new("P50_binwalk_extractor")
            .description("Extract the firmware with binwalk")
            .fallback("P55_unblob_extractor")
            .produces_output()
    }

    fn create(&self, ctx: &TaskContext, log: TaskLogger) -> Box<dyn Task> {
        Box::new(ExtractRun::new(&BINWALK, ctx, log))
    }
}

impl TaskPlugin for UnblobExtractor {
    fn metadata(&self) -> TaskMetadata {
        TaskMetadata::new("P55_unblob_extractor")
            .description("Extract the firmware with unblob")
            .produces_output()
            .disabled()
    }

    fn create(&self, ctx: &TaskContext, log: TaskLogger) -> Box<dyn Task> {
        Box::new(ExtractRun::new(&UNBLOB, ctx, log))
    }
}

struct ExtractRun {
    tool: &'static Tool,
    firmware: PathBuf,
    out_dir: PathBuf,
    log: TaskLogger,
}

impl ExtractRun {
    fn new(tool: &'static Tool, ctx: &TaskContext, log: TaskLogger) -> Self {
        Self {
            tool,
            firmware: ctx.firmware_path.clone(),
            out_dir: ctx.output_dir.join(tool.binary),
            log,
        }
    }
}

impl Task for ExtractRun {
    fn pre_run(&mut self) -> bool {
        if self.firmware.is_dir() {
            self.log
                .info("firmware is already a directory, nothing to extract");
            return false;
        }
        true
    }

    fn run(&mut self) -> Result<i32, TaskFault> {
        let binary = match which::which(self.tool.binary) {
            Ok(path) => path,
            Err(e) => {
                self.log
                    .error(format!("{} not found in PATH: {}", self.tool.binary, e));
                return Ok(TOOL_MISSING_EXIT_CODE);
            }
        };

        fs::create_dir_all(&self.out_dir)?;
        self.log.info(format!(
            "extracting {} into {}",
            self.firmware.display(),
            self.out_dir.display()
        ));
        let output = Command::new(&binary)
            .args((self.tool.args)(&self.firmware, &self.out_dir))
            .output()?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            self.log.debug(line);
        }
        let Some(code) = output.status.code() else {
            return Err(TaskFault::Other(format!(
                "{} terminated by signal",
                self.tool.binary
            )));
        };
        if code != 0 {
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                self.log.warning(line);
            }
            self.log
                .error(format!("{} exited with code {}", self.tool.binary, code));
        } else {
            self.log.success(format!("{} finished", self.tool.binary));
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwpipe_core::executor::{run_attempt, AttemptOutcome};
    use fwpipe_core::task::NullSink;
    use std::sync::Arc;

    fn logger() -> TaskLogger {
        TaskLogger::new("P50_binwalk_extractor", Arc::new(NullSink))
    }

    #[test]
    fn binwalk_falls_back_to_unblob() {
        let binwalk = BinwalkExtractor.metadata();
        let unblob = UnblobExtractor.metadata();
        assert_eq!(binwalk.fallback.as_deref(), Some("P55_unblob_extractor"));
        assert!(binwalk.enabled);
        assert!(!unblob.enabled);
    }

    #[test]
    fn output_lands_in_a_per_tool_directory() {
        let ctx = TaskContext {
            firmware_path: PathBuf::from("/fw/image.bin"),
            output_dir: PathBuf::from("/out"),
            ..TaskContext::default()
        };
        let run = ExtractRun::new(&BINWALK, &ctx, logger());
        assert_eq!(run.out_dir, PathBuf::from("/out/binwalk"));
        let args = (UNBLOB.args)(&run.firmware, Path::new("/out/unblob"));
        assert_eq!(args, vec![OsString::from("--extract-dir"), "/out/unblob".into(), "/fw/image.bin".into()]);
    }

    #[test]
    fn directory_firmware_is_declined() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TaskContext {
            firmware_path: dir.path().to_path_buf(),
            output_dir: dir.path().join("out"),
            ..TaskContext::default()
        };
        let outcome = run_attempt(&BinwalkExtractor, &ctx, logger());
        assert!(matches!(outcome, AttemptOutcome::Declined));
    }

    #[test]
    fn missing_tool_exits_127() {
        const ABSENT: Tool = Tool {
            binary: "fwpipe-no-such-extractor",
            args: |_, _| Vec::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        let ctx = TaskContext {
            firmware_path: dir.path().join("fw.bin"),
            output_dir: dir.path().join("out"),
            ..TaskContext::default()
        };
        let log = logger();
        let mut run = ExtractRun::new(&ABSENT, &ctx, log.clone());

        assert_eq!(run.run().unwrap(), TOOL_MISSING_EXIT_CODE);
        assert!(log.captured_errors().contains("not found in PATH"));
        assert!(!dir.path().join("out").exists());
    }
}
