use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::executor::{RunSummary, TaskResult, TaskStatus};
use crate::monitor::ResourceSummary;
use crate::recovery::ErrorSummary;
use crate::registry::{Category, ModuleRegistry};

/// Exit code of a run that ended on a critical error.
pub const ABORT_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub category: Category,
    pub ran: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub duration_ms: u64,
    pub tasks: Vec<String>,
    pub exit_codes: BTreeMap<String, i32>,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// The phase deadline cut dispatch short.
    pub deadline_hit: bool,
    /// Completed tasks that declare output for later phases.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
}

impl PhaseReport {
    pub fn skipped(category: Category, reason: impl Into<String>) -> Self {
        Self {
            category,
            ran: false,
            skip_reason: Some(reason.into()),
            duration_ms: 0,
            tasks: Vec::new(),
            exit_codes: BTreeMap::new(),
            completed: 0,
            failed: 0,
            skipped: 0,
            deadline_hit: false,
            outputs: Vec::new(),
        }
    }

    pub fn from_results(
        category: Category,
        tasks: Vec<String>,
        results: &BTreeMap<String, TaskResult>,
        duration_ms: u64,
    ) -> Self {
        let count = |status| results.values().filter(|r| r.status == status).count();
        Self {
            category,
            ran: true,
            skip_reason: None,
            duration_ms,
            exit_codes: results
                .iter()
                .filter(|(_, r)| r.status != TaskStatus::Skipped)
                .map(|(name, r)| (name.clone(), r.exit_code))
                .collect(),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Failed),
            skipped: count(TaskStatus::Skipped),
            tasks,
            deadline_hit: false,
            outputs: Vec::new(),
        }
    }

    /// Record which completed tasks are output producers according to
    /// `registry`.
    pub fn with_outputs(
        mut self,
        results: &BTreeMap<String, TaskResult>,
        registry: &ModuleRegistry,
    ) -> Self {
        self.outputs = results
            .values()
            .filter(|r| r.status == TaskStatus::Completed)
            .filter(|r| registry.get(&r.task).is_some_and(|d| d.produces_output))
            .map(|r| r.task.clone())
            .collect();
        self
    }

    /// An output-producing task of the phase completed. Tasks that only
    /// check or inspect never count.
    pub fn produced_output(&self) -> bool {
        !self.outputs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    CompletedWithFailures,
    Aborted,
}

impl RunOutcome {
    /// Ordinary task failures do not fail the process.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Succeeded | Self::CompletedWithFailures => 0,
            Self::Aborted => ABORT_EXIT_CODE,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::CompletedWithFailures => "completed with failures",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<PhaseReport>,
    pub summary: RunSummary,
    pub errors: ErrorSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSummary>,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub exit_code: i32,
}

impl RunReport {
    pub fn phase(&self, category: Category) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.category == category)
    }
}
