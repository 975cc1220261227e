use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::executor::invoke::TaskInvoker;
use crate::executor::isolation::{InProcess, ThreadIsolation};
use crate::executor::traits::{
    ConcurrencyContext, ConcurrencyPolicy, ExecutionStrategy, IsolationBackend,
};
use crate::executor::types::{DispatchOptions, StrategyKind};
use crate::monitor::ResourceMonitor;
use crate::registry::TaskDescriptor;

/// Bounded pool of workers pulling from one shared queue. Results are
/// stored as they complete; there is no ordering between tasks.
#[derive(Clone)]
pub struct WorkerPool {
    kind: StrategyKind,
    prefix: &'static str,
    backend: Arc<dyn IsolationBackend>,
    policy: Option<Arc<dyn ConcurrencyPolicy>>,
    monitor: Option<Arc<ResourceMonitor>>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::bounded()
    }
}

impl WorkerPool {
    /// In-process pool on the blocking thread pool.
    pub fn bounded() -> Self {
        Self {
            kind: StrategyKind::BoundedPool,
            prefix: "pool",
            backend: Arc::new(InProcess),
            policy: None,
            monitor: None,
        }
    }

    /// Pool whose attempts run behind `backend`'s isolation boundary.
    pub fn isolated(backend: Arc<dyn IsolationBackend>) -> Self {
        Self {
            kind: StrategyKind::IsolatedPool,
            prefix: "isolated",
            backend,
            policy: None,
            monitor: None,
        }
    }

    pub fn thread_isolated() -> Self {
        Self::isolated(Arc::new(ThreadIsolation))
    }

    pub fn with_policy(mut self, policy: Arc<dyn ConcurrencyPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Load source for the concurrency policy.
    pub fn with_monitor(mut self, monitor: Arc<ResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// `min(policy(max_workers), pending)`, at least 1. Without a policy, or
    /// before the monitor has a sample, the policy step is skipped.
    pub fn pool_size(&self, max_workers: usize, pending: usize) -> usize {
        let base = max_workers.max(1);
        let sample = self.monitor.as_ref().and_then(|m| m.latest());
        let desired = match (&self.policy, sample) {
            (Some(policy), Some(sample)) => {
                let ctx = ConcurrencyContext {
                    cpu_usage: sample.cpu_percent,
                    available_cpus: num_cpus::get(),
                    memory_usage: sample.memory_percent,
                    pending_tasks: pending,
                    base_concurrency: base,
                };
                let size = policy.calculate_concurrency(&ctx);
                tracing::debug!(
                    "{} concurrency at {:.1}% cpu: {} -> {}",
                    policy.name(),
                    sample.cpu_percent,
                    base,
                    size
                );
                size
            }
            _ => base,
        };
        desired.min(pending).max(1)
    }
}

#[async_trait]
impl ExecutionStrategy for WorkerPool {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn execute(
        &self,
        tasks: &[TaskDescriptor],
        opts: &DispatchOptions,
        invoker: &TaskInvoker,
    ) {
        if tasks.is_empty() {
            return;
        }

        let size = self.pool_size(opts.max_workers, tasks.len());
        tracing::debug!("{}: {} task(s) on {} worker(s)", self.kind, tasks.len(), size);

        let queue: Mutex<VecDeque<&TaskDescriptor>> = Mutex::new(tasks.iter().collect());
        let queue = &queue;
        let next = || match queue.lock() {
            Ok(mut g) => g.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };

        let mut workers: FuturesUnordered<_> = (0..size)
            .map(|n| {
                let worker = format!("{}-{}", self.prefix, n);
                async move {
                    while !opts.stop.is_cancelled() {
                        let Some(task) = next() else {
                            break;
                        };
                        invoker.invoke(task, &worker, opts, &self.backend).await;
                    }
                }
            })
            .collect();
        while workers.next().await.is_some() {}

        let leftover: Vec<&TaskDescriptor> = match queue.lock() {
            Ok(mut g) => g.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for task in leftover {
            invoker.skip(task, "dispatch stopped");
        }
    }
}
