//! Process isolation: every attempt runs in a fresh `fwpipe worker` child.
//!
//! The parent passes the task context as JSON in [`CONTEXT_ENV`]. The child
//! runs the task and prints exactly one line starting with
//! [`RESULT_PREFIX`] followed by a JSON [`WorkerReport`]. Anything else on
//! stdout is treated as task output; stderr carries the child's own logs.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use fwpipe_core::error::ExecutorError;
use fwpipe_core::executor::{run_attempt, Attempt, AttemptOutcome, AttemptRequest, IsolationBackend};
use fwpipe_core::registry::ModuleRegistry;
use fwpipe_core::task::{LogSink, TaskContext, TaskFault, TaskLogger, WireFault};

pub const CONTEXT_ENV: &str = "FWPIPE_TASK_CONTEXT";
pub const RESULT_PREFIX: &str = "@@fwpipe-result@@ ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireOutcome {
    Exited { code: i32 },
    Declined,
    Faulted { fault: WireFault },
}

/// What a worker child reports back for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub outcome: WireOutcome,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub errors: String,
}

impl WorkerReport {
    pub fn from_outcome(outcome: &AttemptOutcome, logger: &TaskLogger) -> Self {
        let outcome = match outcome {
            AttemptOutcome::Exited(code) => WireOutcome::Exited { code: *code },
            AttemptOutcome::Declined => WireOutcome::Declined,
            AttemptOutcome::Faulted(fault) => WireOutcome::Faulted {
                fault: fault.to_wire(),
            },
        };
        Self {
            outcome,
            output: logger.captured_output(),
            errors: logger.captured_errors(),
        }
    }

    pub fn into_attempt(self) -> Attempt {
        let outcome = match self.outcome {
            WireOutcome::Exited { code } => AttemptOutcome::Exited(code),
            WireOutcome::Declined => AttemptOutcome::Declined,
            WireOutcome::Faulted { fault } => AttemptOutcome::Faulted(TaskFault::from_wire(fault)),
        };
        Attempt {
            outcome,
            output: self.output,
            errors: self.errors,
            worker: None,
        }
    }

    /// The single line a worker prints on stdout.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{RESULT_PREFIX}{}", serde_json::to_string(self)?))
    }
}

/// Worker side: run one registered task in this process and build the
/// report the parent expects.
pub fn run_worker(
    registry: &ModuleRegistry,
    task: &str,
    context: &TaskContext,
    sink: Arc<dyn LogSink>,
) -> WorkerReport {
    let logger = TaskLogger::new(task, sink);
    let outcome = match registry.plugin(task) {
        Some(plugin) => run_attempt(plugin.as_ref(), context, logger.clone()),
        None => AttemptOutcome::Faulted(TaskFault::MissingDependency(format!(
            "task {task} is not registered in the worker"
        ))),
    };
    WorkerReport::from_outcome(&outcome, &logger)
}

/// Read the context the parent handed over, falling back to defaults when
/// the variable is absent.
pub fn context_from_env() -> anyhow::Result<TaskContext> {
    match std::env::var(CONTEXT_ENV) {
        Ok(raw) if !raw.trim().is_empty() => {
            serde_json::from_str(&raw).with_context(|| format!("invalid {CONTEXT_ENV}"))
        }
        _ => Ok(TaskContext::default()),
    }
}

/// Split a worker's stdout into its report and any stray output lines.
pub fn parse_worker_stdout(stdout: &str) -> (Option<WorkerReport>, String) {
    let mut report = None;
    let mut stray = String::new();
    for line in stdout.lines() {
        match line.strip_prefix(RESULT_PREFIX) {
            Some(json) => match serde_json::from_str::<WorkerReport>(json) {
                Ok(parsed) => report = Some(parsed),
                Err(e) => tracing::warn!("unparseable worker result line: {}", e),
            },
            None => {
                stray.push_str(line);
                stray.push('\n');
            }
        }
    }
    (report, stray)
}

/// Runs attempts in a child process. The child is killed when the attempt
/// times out.
#[derive(Debug, Clone)]
pub struct SubprocessIsolation {
    program: PathBuf,
    args: Vec<String>,
}

impl SubprocessIsolation {
    /// Re-execute the running binary.
    pub fn current_exe() -> Result<Self, ExecutorError> {
        let program = std::env::current_exe().map_err(|e| {
            ExecutorError::Spawn(format!("cannot locate the running executable: {e}"))
        })?;
        Ok(Self::new(program, Vec::new()))
    }

    /// `args` go before the `worker --task <name>` arguments.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn command(&self, task: &str, context: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(["worker", "--task", task])
            .env(CONTEXT_ENV, context)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl IsolationBackend for SubprocessIsolation {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn run(&self, request: AttemptRequest) -> Attempt {
        let task = request.descriptor.name.clone();
        let context = match serde_json::to_string(&request.context) {
            Ok(json) => json,
            Err(e) => {
                return Attempt::new(AttemptOutcome::Faulted(TaskFault::InvalidInput(format!(
                    "cannot serialize task context: {e}"
                ))))
            }
        };

        let child = match self.command(&task, &context).spawn() {
            Ok(child) => child,
            Err(e) => {
                return Attempt::new(AttemptOutcome::Faulted(TaskFault::ResourceExhausted(
                    format!("cannot spawn worker process: {e}"),
                )))
            }
        };
        let worker = child.id().map(|pid| format!("pid-{pid}"));
        tracing::debug!(task = %task, worker = ?worker, "worker process spawned");

        // Dropping the wait future drops the child, and kill_on_drop reaps it.
        let waited = match request.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    tracing::warn!(task = %task, "worker exceeded {:?}, killed", limit);
                    let mut attempt = Attempt::new(AttemptOutcome::Faulted(TaskFault::Timeout(limit)));
                    attempt.worker = worker;
                    return attempt;
                }
            },
            None => child.wait_with_output().await,
        };

        let mut attempt = match waited {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let (report, stray) = parse_worker_stdout(&stdout);
                match report {
                    Some(report) => {
                        let mut attempt = report.into_attempt();
                        if !stray.is_empty() {
                            attempt.output = format!("{stray}{}", attempt.output);
                        }
                        attempt
                    }
                    None => {
                        let stderr = String::from_utf8_lossy(&output.stderr);
                        let mut attempt = Attempt::new(AttemptOutcome::Faulted(TaskFault::Panicked(
                            format!("worker exited ({}) without a result", output.status),
                        )));
                        attempt.output = stray;
                        attempt.errors = stderr.into_owned();
                        attempt
                    }
                }
            }
            Err(e) => Attempt::new(AttemptOutcome::Faulted(TaskFault::Io(e))),
        };
        attempt.worker = worker;
        attempt
    }
}
