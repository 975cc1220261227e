//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `fwpipe_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load, ConcurrencyConfig, ConcurrencyMode, IsolationKind, LoggingConfig, PipelineConfig,
};
pub use crate::error::{CliError, ConfigError, ExecutorError, RegistryError};
pub use crate::executor::{
    Attempt, AttemptOutcome, AttemptRequest, ConcurrencyContext, ConcurrencyPolicy, Executor,
    IsolationBackend, RunSummary, StrategyKind, TaskResult, TaskStatus,
};
pub use crate::monitor::{ResourceMonitor, ResourceSummary};
pub use crate::pipeline::{PipelineController, PipelineOptions, RunOutcome, RunReport};
pub use crate::recovery::{ErrorCategory, ErrorHandler, ErrorSeverity};
pub use crate::registry::{plan, Category, ExecutionPlan, ModuleRegistry, TaskDescriptor};
pub use crate::shutdown::ShutdownSignal;
pub use crate::task::{
    PluginSource, StaticSource, Task, TaskContext, TaskFault, TaskLogger, TaskMetadata,
    TaskPlugin, TracingSink, WireFault,
};
