use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use super::traits::{Attempt, AttemptOutcome, AttemptRequest, IsolationBackend};
use super::types::{DispatchOptions, ResultStore, TaskResult, TaskStatus, FAULT_EXIT_CODE};
use crate::recovery::{
    recovery_action, ErrorCategory, ErrorHandler, ErrorRecord, ErrorSeverity, RecoveryAction,
    RecoveryContext, RecoveryOutcome,
};
use crate::registry::{ModuleRegistry, TaskDescriptor};
use crate::task::{LogSink, SectionMarker, TaskContext, TaskFault, TaskLogger, TaskPlugin};

/// Exit codes that mean "do not retry this exact failure".
pub const NON_RETRYABLE_EXIT_CODES: [i32; 4] = [1, 2, 126, 127];

type AttemptSlot = Arc<Mutex<Option<Attempt>>>;

fn lock_slot(slot: &AttemptSlot) -> MutexGuard<'_, Option<Attempt>> {
    match slot.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
}

impl PerformanceStats {
    fn record(&mut self, result: &TaskResult) {
        match result.status {
            TaskStatus::Completed => self.successful_executions += 1,
            TaskStatus::Failed => self.failed_executions += 1,
            _ => return,
        }
        self.total_executions += 1;
        self.total_duration_ms += result.duration_ms;
        self.average_duration_ms = self.total_duration_ms / self.total_executions;
    }
}

/// Everything needed to repeat an attempt of one task.
#[derive(Clone)]
struct AttemptRunner {
    backend: Arc<dyn IsolationBackend>,
    plugin: Arc<dyn TaskPlugin>,
    descriptor: TaskDescriptor,
    context: TaskContext,
    sink: Arc<dyn LogSink>,
    timeout: Option<Duration>,
}

impl AttemptRunner {
    async fn run(&self) -> Attempt {
        let request = AttemptRequest {
            plugin: self.plugin.clone(),
            descriptor: self.descriptor.clone(),
            context: self.context.clone(),
            logger: TaskLogger::new(&self.descriptor.name, self.sink.clone()),
            timeout: self.timeout,
        };
        self.backend.run(request).await
    }

    /// Re-run and keep the attempt in `slot` for the invoker to pick up.
    fn into_action(self, slot: AttemptSlot) -> RecoveryAction {
        recovery_action(move || {
            let runner = self.clone();
            let slot = slot.clone();
            async move {
                let attempt = runner.run().await;
                let verdict = attempt.verdict();
                *lock_slot(&slot) = Some(attempt);
                verdict
            }
        })
    }
}

fn cleanup_action(dir: std::path::PathBuf) -> RecoveryAction {
    recovery_action(move || {
        let dir = dir.clone();
        async move {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(format!("cannot clear {}: {e}", dir.display())),
            }
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| format!("cannot recreate {}: {e}", dir.display()))
        }
    })
}

/// Seconds handed to the task context, rounded up so a sub-second limit
/// never reads as zero.
fn whole_secs(timeout: Duration) -> u64 {
    timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)
}

/// Classification of a failed first attempt, `None` when nothing failed.
fn classify(task: &str, outcome: &AttemptOutcome) -> Option<ErrorRecord> {
    match outcome {
        AttemptOutcome::Exited(0) | AttemptOutcome::Declined => None,
        AttemptOutcome::Exited(code) => Some(
            ErrorRecord::new(
                "NonZeroExit",
                format!("{task} exited with code {code}"),
                ErrorSeverity::Medium,
                ErrorCategory::Module,
            )
            .task(task),
        ),
        AttemptOutcome::Faulted(fault) => {
            let severity = if !fault.is_recoverable() {
                ErrorSeverity::Critical
            } else if matches!(fault, TaskFault::Timeout(_) | TaskFault::Panicked(_)) {
                ErrorSeverity::High
            } else {
                ErrorSeverity::Medium
            };
            Some(ErrorRecord::from_fault(fault, None, severity).task(task))
        }
    }
}

/// Runs single task invocations: lifecycle, timeout, recovery and result
/// bookkeeping. Shared by every strategy of a run.
pub struct TaskInvoker {
    registry: Arc<ModuleRegistry>,
    context: TaskContext,
    sink: Arc<dyn LogSink>,
    errors: Arc<ErrorHandler>,
    store: ResultStore,
    default_timeout: Option<Duration>,
    stats: Mutex<PerformanceStats>,
}

impl TaskInvoker {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        context: TaskContext,
        sink: Arc<dyn LogSink>,
        errors: Arc<ErrorHandler>,
    ) -> Self {
        Self {
            registry,
            context,
            sink,
            errors,
            store: ResultStore::new(),
            default_timeout: None,
            stats: Mutex::new(PerformanceStats::default()),
        }
    }

    pub fn with_store(mut self, store: ResultStore) -> Self {
        self.store = store;
        self
    }

    /// Timeout for tasks that declare none and get none from the dispatch.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn errors(&self) -> &Arc<ErrorHandler> {
        &self.errors
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    pub fn performance(&self) -> PerformanceStats {
        match self.stats.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Record a task that will not be started.
    pub fn skip(&self, descriptor: &TaskDescriptor, reason: &str) -> TaskResult {
        tracing::debug!(task = %descriptor.name, "skipping: {}", reason);
        self.publish(TaskResult::skipped(&descriptor.name, reason))
    }

    /// Run one task to a terminal result. Never fails: every fault ends up
    /// in the returned (and stored) `TaskResult`.
    pub async fn invoke(
        &self,
        descriptor: &TaskDescriptor,
        worker: &str,
        opts: &DispatchOptions,
        backend: &Arc<dyn IsolationBackend>,
    ) -> TaskResult {
        let name = descriptor.name.as_str();
        let mut result = TaskResult::pending(name);
        let Some(plugin) = self.registry.plugin(name) else {
            result.skip(format!("task {name} is not registered"));
            return self.publish(result);
        };

        result.start(worker);
        self.sink.section(&SectionMarker::TaskStart {
            task: name.to_string(),
            worker: worker.to_string(),
        });

        let timeout = descriptor
            .timeout
            .or(opts.timeout)
            .or(self.default_timeout);
        let runner = AttemptRunner {
            backend: backend.clone(),
            plugin,
            descriptor: descriptor.clone(),
            context: self.context.for_task(descriptor, timeout.map(whole_secs)),
            sink: self.sink.clone(),
            timeout,
        };

        let first = runner.run().await;
        if let Some(id) = &first.worker {
            result.worker = Some(id.clone());
        }

        let (last, note) = match classify(name, &first.outcome) {
            None => (first, None),
            Some(record) => self.recover(&runner, record, first, &mut result).await,
        };
        apply(&mut result, last, note);
        self.publish(result)
    }

    async fn recover(
        &self,
        runner: &AttemptRunner,
        record: ErrorRecord,
        first: Attempt,
        result: &mut TaskResult,
    ) -> (Attempt, Option<String>) {
        let name = runner.descriptor.name.clone();
        let retry_slot: AttemptSlot = Arc::new(Mutex::new(None));
        let fallback_slot: AttemptSlot = Arc::new(Mutex::new(None));

        let mut context = RecoveryContext::new();
        match &first.outcome {
            AttemptOutcome::Exited(code) => {
                context = context.detail("exit_code", *code);
                if !NON_RETRYABLE_EXIT_CODES.contains(code) {
                    context = context.with_retry(runner.clone().into_action(retry_slot.clone()));
                }
            }
            AttemptOutcome::Faulted(fault) => {
                context = context
                    .detail("fault", fault.kind())
                    .with_retry(runner.clone().into_action(retry_slot.clone()));
            }
            AttemptOutcome::Declined => {}
        }
        if let Some(fallback) = self.fallback_runner(runner) {
            let fb_name = fallback.descriptor.name.clone();
            context = context.with_fallback(fb_name, fallback.into_action(fallback_slot.clone()));
        }
        if record.category == ErrorCategory::Resource {
            match runner.context.task_temp_dir(&name) {
                Some(dir) => context = context.with_cleanup(cleanup_action(dir)),
                None => tracing::debug!(task = %name, "no scratch directory to clean up"),
            }
        }

        let mut record = record
            .max_retries(self.errors.max_retries())
            .context(context);
        let outcome = self.errors.handle_outcome(&mut record).await;
        result.retry_count = record.retry_count;

        match outcome {
            RecoveryOutcome::Recovered("retry") => {
                let last = lock_slot(&retry_slot).take().unwrap_or(first);
                (last, None)
            }
            RecoveryOutcome::Recovered("fallback") => {
                let fb = lock_slot(&fallback_slot).take();
                let fb_task = runner.descriptor.fallback.clone().unwrap_or_default();
                let mut merged = Attempt::new(AttemptOutcome::Exited(0));
                merged.output = first.output;
                if let Some(fb) = fb {
                    merged.output.push_str(&fb.output);
                }
                (
                    merged,
                    Some(format!("recovered by fallback {fb_task}: {}", record.message)),
                )
            }
            RecoveryOutcome::Recovered("resource-cleanup") => {
                tracing::info!(task = %name, "re-running after resource cleanup");
                (runner.run().await, None)
            }
            RecoveryOutcome::Recovered(strategy) => {
                let mut recovered = Attempt::new(AttemptOutcome::Exited(0));
                recovered.output = first.output;
                (
                    recovered,
                    Some(format!("recovered by {strategy}: {}", record.message)),
                )
            }
            RecoveryOutcome::Failed(_) | RecoveryOutcome::Unhandled => {
                let last = lock_slot(&retry_slot).take().unwrap_or(first);
                (last, None)
            }
        }
    }

    fn fallback_runner(&self, primary: &AttemptRunner) -> Option<AttemptRunner> {
        let fb_name = primary.descriptor.fallback.as_deref()?;
        let (Some(plugin), Some(descriptor)) =
            (self.registry.plugin(fb_name), self.registry.get(fb_name))
        else {
            tracing::warn!(
                task = %primary.descriptor.name,
                "fallback {} is not registered",
                fb_name
            );
            return None;
        };
        Some(AttemptRunner {
            plugin,
            context: self.context.for_task(descriptor, primary.context.timeout_secs),
            descriptor: descriptor.clone(),
            ..primary.clone()
        })
    }

    fn publish(&self, result: TaskResult) -> TaskResult {
        self.sink.section(&SectionMarker::TaskEnd {
            task: result.task.clone(),
            status: result.status,
            exit_code: result.exit_code,
            duration_ms: result.duration_ms,
        });
        match self.stats.lock() {
            Ok(mut g) => g.record(&result),
            Err(poisoned) => poisoned.into_inner().record(&result),
        }
        self.store.insert(result.clone());
        result
    }
}

fn apply(result: &mut TaskResult, attempt: Attempt, note: Option<String>) {
    if let Some(id) = attempt.worker {
        result.worker = Some(id);
    }
    result.output = attempt.output;
    match attempt.outcome {
        AttemptOutcome::Exited(code) => {
            if code != 0 {
                let errors = attempt.errors.trim();
                result.error = Some(if errors.is_empty() {
                    format!("exited with code {code}")
                } else {
                    errors.to_string()
                });
            }
            result.finish(code);
        }
        AttemptOutcome::Declined => result.skip("pre-run validation declined"),
        AttemptOutcome::Faulted(fault) => {
            result.fail(fault.kind(), fault.to_string(), FAULT_EXIT_CODE)
        }
    }
    if note.is_some() {
        result.error = note;
    }
}
