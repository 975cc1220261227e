//! Concurrency executor.
//!
//! ```text
//! Executor::execute(tasks, kind)
//!   -> ExecutionStrategy (Sequential | WorkerPool | Hybrid)
//!     -> TaskInvoker::invoke (lifecycle, timeout, recovery)
//!       -> IsolationBackend::run (in-process | thread | subprocess)
//!   -> ResultStore
//! ```

mod engine;
mod invoke;
mod isolation;
pub mod strategies;
pub mod traits;
pub mod types;

pub use engine::{Executor, ExecutorBuilder};
pub use invoke::{PerformanceStats, TaskInvoker, NON_RETRYABLE_EXIT_CODES};
pub use isolation::{run_attempt, InProcess, ThreadIsolation};
pub use strategies::{is_heavy, Hybrid, Sequential, WorkerPool};
pub use traits::{
    Attempt, AttemptOutcome, AttemptRequest, ConcurrencyContext, ConcurrencyPolicy,
    ExecutionStrategy, IsolationBackend,
};
pub use types::{
    DispatchOptions, ResultStore, RunSummary, StrategyKind, TaskResult, TaskStatus,
    FAULT_EXIT_CODE,
};
