use std::sync::Arc;

use async_trait::async_trait;

use crate::executor::invoke::TaskInvoker;
use crate::executor::isolation::InProcess;
use crate::executor::traits::{ExecutionStrategy, IsolationBackend};
use crate::executor::types::{DispatchOptions, StrategyKind, TaskStatus};
use crate::registry::TaskDescriptor;

const WORKER: &str = "seq-0";

/// One task at a time, in the given order. The first task that ends up
/// `Failed` abandons the rest, which are recorded as `Skipped`.
#[derive(Clone)]
pub struct Sequential {
    backend: Arc<dyn IsolationBackend>,
}

impl Default for Sequential {
    fn default() -> Self {
        Self::new(Arc::new(InProcess))
    }
}

impl Sequential {
    pub fn new(backend: Arc<dyn IsolationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ExecutionStrategy for Sequential {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    async fn execute(
        &self,
        tasks: &[TaskDescriptor],
        opts: &DispatchOptions,
        invoker: &TaskInvoker,
    ) {
        for (i, task) in tasks.iter().enumerate() {
            if opts.stop.is_cancelled() {
                for rest in &tasks[i..] {
                    invoker.skip(rest, "dispatch stopped");
                }
                return;
            }

            let result = invoker.invoke(task, WORKER, opts, &self.backend).await;
            if result.status == TaskStatus::Failed {
                let rest = &tasks[i + 1..];
                if !rest.is_empty() {
                    tracing::warn!(
                        "{} failed; abandoning {} remaining task(s)",
                        task.name,
                        rest.len()
                    );
                }
                let reason = format!("abandoned after {} failed", task.name);
                for t in rest {
                    invoker.skip(t, &reason);
                }
                return;
            }
        }
    }
}
