use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::invoke::{PerformanceStats, TaskInvoker};
use super::isolation::ThreadIsolation;
use super::strategies::{Hybrid, Sequential, WorkerPool};
use super::traits::{ConcurrencyPolicy, ExecutionStrategy, IsolationBackend};
use super::types::{DispatchOptions, ResultStore, RunSummary, StrategyKind, TaskResult};
use crate::monitor::ResourceMonitor;
use crate::recovery::ErrorHandler;
use crate::registry::{ModuleRegistry, TaskDescriptor};
use crate::shutdown::ShutdownSignal;
use crate::task::{LogSink, TaskContext, TracingSink};

/// Runs task sets under a chosen strategy. All strategies share one
/// invoker, hence one result store and one error handler.
pub struct Executor {
    invoker: TaskInvoker,
    strategies: HashMap<StrategyKind, Arc<dyn ExecutionStrategy>>,
    shutdown: ShutdownSignal,
    max_workers: usize,
}

pub struct ExecutorBuilder {
    registry: Arc<ModuleRegistry>,
    errors: Arc<ErrorHandler>,
    context: TaskContext,
    sink: Arc<dyn LogSink>,
    store: ResultStore,
    default_timeout: Option<Duration>,
    max_workers: usize,
    isolation: Arc<dyn IsolationBackend>,
    policy: Option<Arc<dyn ConcurrencyPolicy>>,
    monitor: Option<Arc<ResourceMonitor>>,
    overrides: Vec<Arc<dyn ExecutionStrategy>>,
}

impl ExecutorBuilder {
    pub fn context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn store(mut self, store: ResultStore) -> Self {
        self.store = store;
        self
    }

    pub fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Backend of the isolated pool (and of the heavy half of hybrid).
    pub fn isolation(mut self, backend: Arc<dyn IsolationBackend>) -> Self {
        self.isolation = backend;
        self
    }

    pub fn policy(mut self, policy: Arc<dyn ConcurrencyPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn monitor(mut self, monitor: Arc<ResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Replace the built-in strategy of the same kind.
    pub fn strategy(mut self, strategy: Arc<dyn ExecutionStrategy>) -> Self {
        self.overrides.push(strategy);
        self
    }

    fn configure(&self, mut pool: WorkerPool) -> WorkerPool {
        if let Some(policy) = &self.policy {
            pool = pool.with_policy(policy.clone());
        }
        if let Some(monitor) = &self.monitor {
            pool = pool.with_monitor(monitor.clone());
        }
        pool
    }

    pub fn build(self) -> Executor {
        let bounded = self.configure(WorkerPool::bounded());
        let isolated = self.configure(WorkerPool::isolated(self.isolation.clone()));

        let mut strategies: HashMap<StrategyKind, Arc<dyn ExecutionStrategy>> = HashMap::new();
        strategies.insert(StrategyKind::Sequential, Arc::new(Sequential::default()));
        strategies.insert(
            StrategyKind::Hybrid,
            Arc::new(Hybrid::new(isolated.clone(), bounded.clone())),
        );
        strategies.insert(StrategyKind::BoundedPool, Arc::new(bounded));
        strategies.insert(StrategyKind::IsolatedPool, Arc::new(isolated));
        for strategy in self.overrides {
            strategies.insert(strategy.kind(), strategy);
        }

        let shutdown = self.errors.shutdown().clone();
        let invoker = TaskInvoker::new(self.registry, self.context, self.sink, self.errors)
            .with_store(self.store)
            .with_default_timeout(self.default_timeout);

        Executor {
            invoker,
            strategies,
            shutdown,
            max_workers: self.max_workers,
        }
    }
}

impl Executor {
    pub fn builder(registry: Arc<ModuleRegistry>, errors: Arc<ErrorHandler>) -> ExecutorBuilder {
        ExecutorBuilder {
            registry,
            errors,
            context: TaskContext::default(),
            sink: Arc::new(TracingSink),
            store: ResultStore::new(),
            default_timeout: None,
            max_workers: num_cpus::get().clamp(1, 4),
            isolation: Arc::new(ThreadIsolation),
            policy: None,
            monitor: None,
            overrides: Vec::new(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn invoker(&self) -> &TaskInvoker {
        &self.invoker
    }

    pub fn results(&self) -> &ResultStore {
        self.invoker.store()
    }

    pub fn summary(&self) -> RunSummary {
        self.invoker.store().summary()
    }

    pub fn performance(&self) -> PerformanceStats {
        self.invoker.performance()
    }

    /// Options whose stop token follows the run-wide shutdown signal.
    pub fn dispatch_options(&self, max_workers: Option<usize>, timeout: Option<Duration>) -> DispatchOptions {
        DispatchOptions::new(
            max_workers.unwrap_or(self.max_workers),
            self.shutdown.child_token(),
        )
        .timeout(timeout)
    }

    /// Run `tasks` with `kind` and return their results by name.
    pub async fn execute(
        &self,
        tasks: &[TaskDescriptor],
        kind: StrategyKind,
        max_workers: Option<usize>,
        timeout: Option<Duration>,
    ) -> BTreeMap<String, TaskResult> {
        let opts = self.dispatch_options(max_workers, timeout);
        self.execute_with(tasks, kind, &opts).await
    }

    pub async fn execute_with(
        &self,
        tasks: &[TaskDescriptor],
        kind: StrategyKind,
        opts: &DispatchOptions,
    ) -> BTreeMap<String, TaskResult> {
        if tasks.is_empty() {
            return BTreeMap::new();
        }

        let Some(strategy) = self.strategies.get(&kind) else {
            tracing::error!("no {} strategy registered", kind);
            for task in tasks {
                self.invoker.skip(task, "no strategy available");
            }
            return self.collect(tasks);
        };

        tracing::info!(
            "Executing {} task(s) with {} strategy (max {} workers)",
            tasks.len(),
            kind,
            opts.max_workers
        );
        let start = Instant::now();
        strategy.execute(tasks, opts, &self.invoker).await;
        tracing::debug!("{} strategy finished in {:?}", kind, start.elapsed());

        self.collect(tasks)
    }

    fn collect(&self, tasks: &[TaskDescriptor]) -> BTreeMap<String, TaskResult> {
        let names: Vec<String> = tasks.iter().map(|t| t.name.clone()).collect();
        self.invoker.store().select(&names)
    }
}
