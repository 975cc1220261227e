use async_trait::async_trait;

use super::WorkerPool;
use crate::executor::invoke::TaskInvoker;
use crate::executor::traits::ExecutionStrategy;
use crate::executor::types::{DispatchOptions, StrategyKind};
use crate::registry::TaskDescriptor;

const HEAVY_KEYWORDS: [&str; 3] = ["extract", "analyze", "scan"];

/// Whether a task name suggests heavy extraction or scanning work.
pub fn is_heavy(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    HEAVY_KEYWORDS.iter().any(|k| name.contains(k))
}

/// Heavy tasks go to the isolated pool first, the rest to the in-process
/// pool afterwards. Both write to the same result store.
#[derive(Clone)]
pub struct Hybrid {
    isolated: WorkerPool,
    pool: WorkerPool,
}

impl Default for Hybrid {
    fn default() -> Self {
        Self::new(WorkerPool::thread_isolated(), WorkerPool::bounded())
    }
}

impl Hybrid {
    pub fn new(isolated: WorkerPool, pool: WorkerPool) -> Self {
        Self { isolated, pool }
    }
}

#[async_trait]
impl ExecutionStrategy for Hybrid {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    async fn execute(
        &self,
        tasks: &[TaskDescriptor],
        opts: &DispatchOptions,
        invoker: &TaskInvoker,
    ) {
        let (heavy, light): (Vec<TaskDescriptor>, Vec<TaskDescriptor>) =
            tasks.iter().cloned().partition(|t| is_heavy(&t.name));

        if !heavy.is_empty() {
            tracing::info!("Executing {} heavy task(s) in isolated workers", heavy.len());
            self.isolated.execute(&heavy, opts, invoker).await;
        }
        if !light.is_empty() {
            tracing::info!("Executing {} light task(s) in the worker pool", light.len());
            self.pool.execute(&light, opts, invoker).await;
        }
    }
}
