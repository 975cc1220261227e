use std::sync::Arc;
use std::time::Duration;

use fwpipe_core::config::{ConcurrencyMode, ExecutionConfig, IsolationKind, PipelineConfig, RecoveryConfig};
use fwpipe_core::error::ExecutorError;
use fwpipe_core::executor::{ConcurrencyPolicy, Executor, IsolationBackend, ThreadIsolation};
use fwpipe_core::monitor::ResourceMonitor;
use fwpipe_core::recovery::ErrorHandler;
use fwpipe_core::registry::ModuleRegistry;
use fwpipe_core::shutdown::ShutdownSignal;
use fwpipe_core::task::TracingSink;

use crate::executor::{AdaptiveConcurrency, FixedConcurrency, SubprocessIsolation};
use crate::tasks::builtin_sources;

pub fn build_policy(cfg: &ExecutionConfig) -> Arc<dyn ConcurrencyPolicy> {
    match cfg.concurrency.strategy {
        ConcurrencyMode::Fixed => Arc::new(FixedConcurrency::new(cfg.max_parallel_tasks)),
        ConcurrencyMode::Adaptive => Arc::new(AdaptiveConcurrency::new(cfg.concurrency.clone())),
    }
}

pub fn build_isolation(kind: IsolationKind) -> Result<Arc<dyn IsolationBackend>, ExecutorError> {
    match kind {
        IsolationKind::Thread => Ok(Arc::new(ThreadIsolation)),
        IsolationKind::Subprocess => Ok(Arc::new(SubprocessIsolation::current_exe()?)),
    }
}

/// Registry populated from the built-in sources.
pub fn build_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::with_sources(builtin_sources());
    registry.discover();
    registry
}

pub fn build_error_handler(cfg: &RecoveryConfig, shutdown: ShutdownSignal) -> ErrorHandler {
    ErrorHandler::builder(shutdown)
        .default_strategies(Duration::from_millis(cfg.base_delay_ms), cfg.backoff_factor)
        .max_retries(cfg.max_retries)
        .build()
}

pub fn build_monitor(cfg: &PipelineConfig) -> Option<Arc<ResourceMonitor>> {
    cfg.monitor
        .enabled
        .then(|| Arc::new(ResourceMonitor::system()))
}

pub fn build_executor(
    cfg: &PipelineConfig,
    registry: Arc<ModuleRegistry>,
    errors: Arc<ErrorHandler>,
    monitor: Option<Arc<ResourceMonitor>>,
) -> Result<Executor, ExecutorError> {
    let exec = &cfg.execution;
    let mut builder = Executor::builder(registry, errors)
        .context(cfg.task_context())
        .sink(Arc::new(TracingSink))
        .default_timeout(exec.task_timeout_secs.map(Duration::from_secs))
        .max_workers(exec.max_parallel_tasks)
        .isolation(build_isolation(exec.isolation)?)
        .policy(build_policy(exec));
    if let Some(monitor) = monitor {
        builder = builder.monitor(monitor);
    }
    Ok(builder.build())
}
