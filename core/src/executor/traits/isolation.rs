use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::registry::TaskDescriptor;
use crate::task::{TaskContext, TaskFault, TaskLogger, TaskPlugin};

/// Everything needed to run one attempt of one task.
pub struct AttemptRequest {
    pub plugin: Arc<dyn TaskPlugin>,
    pub descriptor: TaskDescriptor,
    pub context: TaskContext,
    pub logger: TaskLogger,
    pub timeout: Option<Duration>,
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Exited(i32),
    /// `pre_run` declined to run the task.
    Declined,
    Faulted(TaskFault),
}

#[derive(Debug)]
pub struct Attempt {
    pub outcome: AttemptOutcome,
    pub output: String,
    pub errors: String,
    /// Set when the backend knows a more precise worker id (e.g. a pid).
    pub worker: Option<String>,
}

impl Attempt {
    pub fn new(outcome: AttemptOutcome) -> Self {
        Self {
            outcome,
            output: String::new(),
            errors: String::new(),
            worker: None,
        }
    }

    /// Attach whatever the task logged through `logger`.
    pub fn captured(outcome: AttemptOutcome, logger: &TaskLogger) -> Self {
        Self {
            outcome,
            output: logger.captured_output(),
            errors: logger.captured_errors(),
            worker: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Exited(0))
    }

    /// `Ok` for exit code zero, otherwise a one-line description.
    pub fn verdict(&self) -> Result<(), String> {
        match &self.outcome {
            AttemptOutcome::Exited(0) => Ok(()),
            AttemptOutcome::Exited(code) => Err(format!("exited with code {code}")),
            AttemptOutcome::Declined => Err("pre-run validation declined".to_string()),
            AttemptOutcome::Faulted(fault) => Err(fault.to_string()),
        }
    }
}

/// Where an attempt physically runs.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, request: AttemptRequest) -> Attempt;
}
