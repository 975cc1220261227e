use async_trait::async_trait;

use crate::executor::invoke::TaskInvoker;
use crate::executor::types::{DispatchOptions, StrategyKind};
use crate::registry::TaskDescriptor;

/// One way of running a set of tasks. Results land in the invoker's
/// `ResultStore`; strategies never propagate task failures.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn execute(
        &self,
        tasks: &[TaskDescriptor],
        opts: &DispatchOptions,
        invoker: &TaskInvoker,
    );
}

/// Pool sizing policy.
pub trait ConcurrencyPolicy: Send + Sync {
    fn name(&self) -> &str;
    fn calculate_concurrency(&self, context: &ConcurrencyContext) -> usize;
}

#[derive(Debug, Clone)]
pub struct ConcurrencyContext {
    pub cpu_usage: f32,
    pub available_cpus: usize,
    pub memory_usage: f32,
    pub pending_tasks: usize,
    pub base_concurrency: usize,
}
