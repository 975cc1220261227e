use std::fs::{self, File};
use std::io::{ErrorKind, Read};

use fwpipe_core::task::{Task, TaskContext, TaskFault, TaskLogger, TaskMetadata, TaskPlugin};

use super::{walk, write_report};

const REPORT_FILE: &str = "p01_firmware_check.txt";
const HEADER_LEN: u64 = 512;

/// (offset, magic, format)
const SIGNATURES: &[(usize, &[u8], &str)] = &[
    (0, b"hsqs", "squashfs (little endian)"),
    (0, b"sqsh", "squashfs (big endian)"),
    (0, &[0x27, 0x05, 0x19, 0x56], "u-boot legacy image"),
    (0, &[0xd0, 0x0d, 0xfe, 0xed], "flattened device tree"),
    (0, &[0x1f, 0x8b], "gzip"),
    (0, b"BZh", "bzip2"),
    (0, &[0xfd, b'7', b'z', b'X', b'Z', 0x00], "xz"),
    (0, &[0x28, 0xb5, 0x2f, 0xfd], "zstd"),
    (0, &[0x5d, 0x00, 0x00], "lzma"),
    (0, b"PK\x03\x04", "zip"),
    (0, &[0x7f, b'E', b'L', b'F'], "elf"),
    (0, b"UBI#", "ubi"),
    (0, &[0x85, 0x19], "jffs2 (little endian)"),
    (0, &[0x19, 0x85], "jffs2 (big endian)"),
    (0, b"070701", "cpio (newc)"),
    (0, b"-rom1fs-", "romfs"),
    (0, &[0x45, 0x3d, 0xcd, 0x28], "cramfs"),
    (0, b"\x89PNG", "png"),
    (257, b"ustar", "tar"),
];

/// Best guess at a firmware blob's container format from its first bytes.
pub fn guess_format(header: &[u8]) -> Option<&'static str> {
    SIGNATURES.iter().find_map(|(offset, magic, name)| {
        header
            .get(*offset..offset + magic.len())
            .filter(|window| window == magic)
            .map(|_| *name)
    })
}

pub struct FirmwareCheck;

impl TaskPlugin for FirmwareCheck {
    fn metadata(&self) -> TaskMetadata {
        TaskMetadata::new("P01_firmware_check")
            .description("Verify the firmware path and guess its format")
    }

    fn about(&self) -> &str {
        "Verify the firmware path and guess its format\n\n\
         Fails when the path is missing or unreadable. For files the first \
         bytes are matched against known container signatures; for \
         directories the entries are counted."
    }

    fn create(&self, ctx: &TaskContext, log: TaskLogger) -> Box<dyn Task> {
        Box::new(FirmwareCheckRun {
            ctx: ctx.clone(),
            log,
        })
    }
}

struct FirmwareCheckRun {
    ctx: TaskContext,
    log: TaskLogger,
}

impl Task for FirmwareCheckRun {
    fn run(&mut self) -> Result<i32, TaskFault> {
        let path = self.ctx.firmware();
        if path.as_os_str().is_empty() {
            self.log.error("no firmware path given");
            return Ok(1);
        }

        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.log.error(format!("firmware {} does not exist", path.display()));
                return Ok(1);
            }
            Err(e) => return Err(e.into()),
        };

        let mut lines = vec![format!("path: {}", path.display())];
        if meta.is_dir() {
            let entries = walk(path);
            let files = entries.iter().filter(|p| p.is_file()).count();
            lines.push("type: directory".to_string());
            lines.push(format!("entries: {}", entries.len()));
            lines.push(format!("files: {files}"));
            self.log.info(format!(
                "firmware is a directory with {} files",
                files
            ));
        } else {
            let mut header = Vec::with_capacity(HEADER_LEN as usize);
            File::open(path)?.take(HEADER_LEN).read_to_end(&mut header)?;
            let format = guess_format(&header).unwrap_or("unknown");
            lines.push("type: file".to_string());
            lines.push(format!("size: {}", meta.len()));
            lines.push(format!("format: {format}"));
            if meta.len() == 0 {
                self.log.warning("firmware file is empty");
            }
            self.log.info(format!(
                "firmware is a {} byte file, format {}",
                meta.len(),
                format
            ));
        }

        write_report(&self.ctx.log_dir.join(REPORT_FILE), &lines)?;
        self.log.success("firmware check passed");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwpipe_core::executor::{run_attempt, AttemptOutcome};
    use fwpipe_core::task::NullSink;
    use std::path::Path;
    use std::sync::Arc;

    fn check(firmware: &Path, log_dir: &Path) -> (AttemptOutcome, TaskLogger) {
        let ctx = TaskContext {
            firmware_path: firmware.to_path_buf(),
            log_dir: log_dir.to_path_buf(),
            ..TaskContext::default()
        };
        let log = TaskLogger::new("P01_firmware_check", Arc::new(NullSink));
        (run_attempt(&FirmwareCheck, &ctx, log.clone()), log)
    }

    #[test]
    fn recognises_common_containers() {
        assert_eq!(guess_format(b"hsqs\x00\x01"), Some("squashfs (little endian)"));
        assert_eq!(guess_format(&[0x27, 0x05, 0x19, 0x56, 0, 0]), Some("u-boot legacy image"));
        assert_eq!(guess_format(b"PK\x03\x04rest"), Some("zip"));
        assert_eq!(guess_format(b"hi"), None);

        let mut tar = vec![0u8; 512];
        tar[257..262].copy_from_slice(b"ustar");
        assert_eq!(guess_format(&tar), Some("tar"));
    }

    #[test]
    fn reports_file_format_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("fw.bin");
        fs::write(&image, b"hsqs-and-then-some").unwrap();

        let (outcome, _) = check(&image, &dir.path().join("logs"));

        assert!(matches!(outcome, AttemptOutcome::Exited(0)));
        let report = fs::read_to_string(dir.path().join("logs").join(REPORT_FILE)).unwrap();
        assert!(report.contains("size: 18"));
        assert!(report.contains("format: squashfs (little endian)"));
    }

    #[test]
    fn missing_firmware_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, log) = check(&dir.path().join("nope.bin"), dir.path());

        assert!(matches!(outcome, AttemptOutcome::Exited(1)));
        assert!(log.captured_errors().contains("does not exist"));
    }

    #[test]
    fn directories_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("rootfs");
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::write(root.join("etc/passwd"), "root:x:0:0").unwrap();

        let (outcome, log) = check(&root, &dir.path().join("logs"));

        assert!(matches!(outcome, AttemptOutcome::Exited(0)));
        assert!(log.captured_output().contains("directory with 1 files"));
    }
}
