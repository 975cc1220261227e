#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fwpipe_core::executor::{Executor, StrategyKind, TaskResult};
use fwpipe_core::recovery::ErrorHandler;
use fwpipe_core::registry::{Category, ModuleRegistry, TaskDescriptor};
use fwpipe_core::shutdown::ShutdownSignal;
use fwpipe_core::task::{NullSink, Task, TaskContext, TaskFault, TaskLogger, TaskMetadata, TaskPlugin};

/// What one run of a scripted task does.
#[derive(Clone, Copy)]
pub enum Step {
    Exit(i32),
    Fault(fn() -> TaskFault),
    Panic,
}

#[derive(Default)]
struct Shared {
    steps: Mutex<VecDeque<Step>>,
    runs: AtomicUsize,
    started: Mutex<Vec<Instant>>,
}

/// Task whose runs follow a script; the last step repeats forever.
#[derive(Clone)]
pub struct Scripted {
    meta: TaskMetadata,
    last: Step,
    sleep: Duration,
    shared: Arc<Shared>,
}

impl Scripted {
    pub fn new(meta: TaskMetadata) -> Self {
        Self {
            meta,
            last: Step::Exit(0),
            sleep: Duration::ZERO,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new(TaskMetadata::new(name))
    }

    pub fn exits(self, codes: &[i32]) -> Self {
        self.steps(codes.iter().map(|c| Step::Exit(*c)).collect())
    }

    pub fn steps(mut self, steps: Vec<Step>) -> Self {
        if let Some(last) = steps.last() {
            self.last = *last;
        }
        *self.shared.steps.lock().unwrap() = steps.into();
        self
    }

    pub fn sleeps(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn runs(&self) -> usize {
        self.shared.runs.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> Vec<Instant> {
        self.shared.started.lock().unwrap().clone()
    }

    pub fn plugin(&self) -> Arc<dyn TaskPlugin> {
        Arc::new(self.clone())
    }
}

struct ScriptedRun {
    log: TaskLogger,
    step: Step,
    sleep: Duration,
}

impl Task for ScriptedRun {
    fn run(&mut self) -> Result<i32, TaskFault> {
        self.log.info("working");
        if !self.sleep.is_zero() {
            std::thread::sleep(self.sleep);
        }
        match self.step {
            Step::Exit(code) => {
                if code != 0 {
                    self.log.error(format!("failing with {code}"));
                }
                Ok(code)
            }
            Step::Fault(make) => Err(make()),
            Step::Panic => panic!("scripted panic"),
        }
    }
}

impl TaskPlugin for Scripted {
    fn metadata(&self) -> TaskMetadata {
        self.meta.clone()
    }

    fn create(&self, _ctx: &TaskContext, log: TaskLogger) -> Box<dyn Task> {
        self.shared.runs.fetch_add(1, Ordering::SeqCst);
        self.shared.started.lock().unwrap().push(Instant::now());
        let step = self.shared.steps.lock().unwrap().pop_front().unwrap_or(self.last);
        Box::new(ScriptedRun {
            log,
            step,
            sleep: self.sleep,
        })
    }
}

pub fn registry(tasks: &[(&Scripted, Category)]) -> Arc<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    for (task, category) in tasks {
        registry.register(task.plugin(), *category).unwrap();
    }
    Arc::new(registry)
}

/// Handler with the default strategies and short backoff.
pub fn handler(base_delay: Duration) -> Arc<ErrorHandler> {
    Arc::new(
        ErrorHandler::builder(ShutdownSignal::new())
            .default_strategies(base_delay, 2.0)
            .max_retries(3)
            .build(),
    )
}

pub fn executor(registry: Arc<ModuleRegistry>, errors: Arc<ErrorHandler>) -> Executor {
    Executor::builder(registry, errors)
        .sink(Arc::new(NullSink))
        .max_workers(4)
        .build()
}

pub fn descriptors(registry: &ModuleRegistry, names: &[&str]) -> Vec<TaskDescriptor> {
    names
        .iter()
        .map(|n| registry.get(n).unwrap().clone())
        .collect()
}

pub async fn run(
    executor: &Executor,
    registry: &ModuleRegistry,
    names: &[&str],
    kind: StrategyKind,
) -> std::collections::BTreeMap<String, TaskResult> {
    executor
        .execute(&descriptors(registry, names), kind, None, None)
        .await
}
