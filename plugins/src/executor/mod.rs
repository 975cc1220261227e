pub mod isolation;
pub mod strategies;

pub use isolation::{
    context_from_env, parse_worker_stdout, run_worker, SubprocessIsolation, WireOutcome,
    WorkerReport, CONTEXT_ENV, RESULT_PREFIX,
};
pub use strategies::{AdaptiveConcurrency, FixedConcurrency};
