use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Exit code recorded when a task ends in a fault rather than a status.
pub const FAULT_EXIT_CODE: i32 = -1;

/// `Pending -> Running -> {Completed, Failed, Skipped}`, plus
/// `Pending -> Skipped` for tasks that never start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Skipped)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Skipped)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of one executed task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub task: String,
    pub status: TaskStatus,
    /// 0 = success; `FAULT_EXIT_CODE` when the attempt faulted.
    pub exit_code: i32,
    /// Captured output (last lines only)
    pub output: String,
    pub error: Option<String>,
    /// Fault kind (`Timeout`, `Panicked`, ...) or `NonZeroExit`.
    pub error_kind: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub worker: Option<String>,
}

impl TaskResult {
    pub fn pending(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            status: TaskStatus::Pending,
            exit_code: 0,
            output: String::new(),
            error: None,
            error_kind: None,
            started_at: None,
            finished_at: None,
            duration_ms: 0,
            retry_count: 0,
            worker: None,
        }
    }

    /// A task that was never started.
    pub fn skipped(task: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut result = Self::pending(task);
        result.skip(reason);
        result
    }

    /// Move to `next` if the state machine allows it. Terminal states are
    /// final; an illegal request is ignored and reported as `false`.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::debug!(
                task = %self.task,
                "ignoring status change {} -> {}",
                self.status,
                next
            );
            return false;
        }
        self.status = next;
        true
    }

    pub fn start(&mut self, worker: &str) {
        if self.transition(TaskStatus::Running) {
            self.started_at = Some(Utc::now());
            self.worker = Some(worker.to_string());
        }
    }

    /// Exit code zero completes the task, anything else fails it.
    pub fn finish(&mut self, exit_code: i32) {
        let next = if exit_code == 0 {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        if self.transition(next) {
            self.exit_code = exit_code;
            if exit_code != 0 && self.error_kind.is_none() {
                self.error_kind = Some("NonZeroExit".to_string());
            }
            self.stamp_end();
        }
    }

    pub fn fail(&mut self, kind: impl Into<String>, message: impl Into<String>, exit_code: i32) {
        if self.transition(TaskStatus::Failed) {
            self.exit_code = exit_code;
            self.error_kind = Some(kind.into());
            self.error = Some(message.into());
            self.stamp_end();
        }
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        if self.transition(TaskStatus::Skipped) {
            self.error = Some(reason.into());
            self.stamp_end();
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    fn stamp_end(&mut self) {
        let end = Utc::now();
        if let Some(start) = self.started_at {
            self.duration_ms = (end - start).num_milliseconds().max(0) as u64;
        }
        self.finished_at = Some(end);
    }
}

/// Aggregate over a set of results. Derived on demand, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_duration_ms: u64,
    /// Mean over tasks that actually ran.
    pub average_duration_ms: u64,
}

impl RunSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a TaskResult>) -> Self {
        let mut summary = Self::default();
        for r in results {
            summary.total += 1;
            match r.status {
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Pending | TaskStatus::Running => {}
            }
            summary.total_duration_ms += r.duration_ms;
        }
        let ran = (summary.completed + summary.failed) as u64;
        if ran > 0 {
            summary.average_duration_ms = summary.total_duration_ms / ran;
        }
        summary
    }
}
