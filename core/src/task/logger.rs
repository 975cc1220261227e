//! The narrow logging interface the engine and tasks depend on.
//!
//! Rendering is someone else's job: the engine only emits leveled lines and
//! section markers through `LogSink`. `TracingSink` forwards both to
//! `tracing`, which is what the binary wires up.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::executor::TaskStatus;
use crate::registry::Category;
use crate::util::Ring;

const CAPTURED_LINES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Structured boundaries between phases and tasks.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionMarker {
    RunStart {
        run_id: String,
    },
    PhaseStart {
        category: Category,
        planned: usize,
    },
    PhaseSkipped {
        category: Category,
        reason: String,
    },
    PhaseEnd {
        category: Category,
        duration_ms: u64,
        failed: usize,
    },
    TaskStart {
        task: String,
        worker: String,
    },
    TaskEnd {
        task: String,
        status: TaskStatus,
        exit_code: i32,
        duration_ms: u64,
    },
    RunEnd {
        run_id: String,
        exit_code: i32,
    },
}

pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, scope: Option<&str>, message: &str);
    fn section(&self, marker: &SectionMarker);
}

/// Forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, scope: Option<&str>, message: &str) {
        let scope = scope.unwrap_or("engine");
        match level {
            LogLevel::Debug => tracing::debug!(task = scope, "{}", message),
            LogLevel::Info => tracing::info!(task = scope, "{}", message),
            LogLevel::Success => tracing::info!(task = scope, outcome = "success", "{}", message),
            LogLevel::Warning => tracing::warn!(task = scope, "{}", message),
            LogLevel::Error => tracing::error!(task = scope, "{}", message),
        }
    }

    fn section(&self, marker: &SectionMarker) {
        match marker {
            SectionMarker::RunStart { run_id } => {
                tracing::info!(run_id = %run_id, "==== run started ====")
            }
            SectionMarker::PhaseStart { category, planned } => {
                tracing::info!("---- phase {} started ({} tasks) ----", category, planned)
            }
            SectionMarker::PhaseSkipped { category, reason } => {
                tracing::info!("---- phase {} skipped: {} ----", category, reason)
            }
            SectionMarker::PhaseEnd {
                category,
                duration_ms,
                failed,
            } => {
                if *failed > 0 {
                    tracing::warn!(
                        "---- phase {} finished in {}ms, {} task(s) failed ----",
                        category,
                        duration_ms,
                        failed
                    )
                } else {
                    tracing::info!("---- phase {} finished in {}ms ----", category, duration_ms)
                }
            }
            SectionMarker::TaskStart { task, worker } => {
                tracing::info!(task = %task, worker = %worker, "task started")
            }
            SectionMarker::TaskEnd {
                task,
                status,
                exit_code,
                duration_ms,
            } => match status {
                TaskStatus::Failed => tracing::warn!(
                    task = %task,
                    exit_code,
                    duration_ms,
                    "task failed"
                ),
                _ => tracing::info!(
                    task = %task,
                    status = %status,
                    exit_code,
                    duration_ms,
                    "task finished"
                ),
            },
            SectionMarker::RunEnd { run_id, exit_code } => {
                tracing::info!(run_id = %run_id, exit_code, "==== run finished ====")
            }
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _scope: Option<&str>, _message: &str) {}
    fn section(&self, _marker: &SectionMarker) {}
}

/// Logger handed to a task instance. Lines are forwarded to the sink and the
/// most recent ones are kept so they can become the task's captured output.
#[derive(Clone)]
pub struct TaskLogger {
    task: Arc<str>,
    sink: Arc<dyn LogSink>,
    output: Ring<String>,
    errors: Ring<String>,
}

impl TaskLogger {
    pub fn new(task: &str, sink: Arc<dyn LogSink>) -> Self {
        Self {
            task: Arc::from(task),
            sink,
            output: Ring::new(CAPTURED_LINES),
            errors: Ring::new(CAPTURED_LINES),
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.sink.log(level, Some(&self.task), message);
        if level != LogLevel::Debug {
            self.output.push(message.to_string());
        }
        if matches!(level, LogLevel::Warning | LogLevel::Error) {
            self.errors.push(message.to_string());
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message)
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Success, message)
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message)
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message)
    }

    pub fn captured_output(&self) -> String {
        join_lines(self.output.snapshot())
    }

    pub fn captured_errors(&self) -> String {
        join_lines(self.errors.snapshot())
    }
}

fn join_lines(lines: Vec<String>) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line);
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}
