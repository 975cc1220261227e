use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::{TaskContext, TaskFault, TaskLogger};
use crate::registry::Category;

/// One pluggable unit of analysis work.
///
/// `run` returns the integer status (`0` success, anything else failure) or a
/// classified fault. Instances are created fresh for every attempt and are
/// never shared between threads.
pub trait Task: Send {
    /// Returning false declines the run; the result becomes `Skipped`.
    fn pre_run(&mut self) -> bool {
        true
    }

    fn run(&mut self) -> Result<i32, TaskFault>;

    /// Always called once `run` has been entered, even after a fault.
    fn post_run(&mut self) {}
}

/// Declared metadata of a task implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMetadata {
    pub name: String,
    pub description: String,
    pub priority: Option<u32>,
    pub dependencies: Vec<String>,
    pub parallel: bool,
    pub max_workers: usize,
    pub timeout: Option<Duration>,
    pub enabled: bool,
    pub fallback: Option<String>,
    /// A completed run leaves extracted content behind for later phases.
    pub produces_output: bool,
}

impl TaskMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            priority: None,
            dependencies: Vec::new(),
            parallel: true,
            max_workers: 1,
            timeout: None,
            enabled: true,
            fallback: None,
            produces_output: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    pub fn produces_output(mut self) -> Self {
        self.produces_output = true;
        self
    }
}

/// Self-registration entry point of a task implementation.
pub trait TaskPlugin: Send + Sync {
    fn metadata(&self) -> TaskMetadata;

    /// Long-form help; its first line is the description fallback.
    fn about(&self) -> &str {
        ""
    }

    fn create(&self, ctx: &TaskContext, log: TaskLogger) -> Box<dyn Task>;
}

#[derive(Error, Debug)]
pub enum PluginLoadError {
    #[error("plugin '{name}' failed to load: {reason}")]
    Failed { name: String, reason: String },
}

/// A category-specific location of task implementations.
pub trait PluginSource: Send + Sync {
    fn category(&self) -> Category;

    /// Human-readable location, used in log lines.
    fn location(&self) -> &str;

    fn load(&self) -> Vec<Result<Arc<dyn TaskPlugin>, PluginLoadError>>;
}

/// Plain in-memory source, used for compiled-in plugin lists.
pub struct StaticSource {
    category: Category,
    location: String,
    entries: Vec<Arc<dyn TaskPlugin>>,
}

impl StaticSource {
    pub fn new(category: Category, location: impl Into<String>) -> Self {
        Self {
            category,
            location: location.into(),
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, plugin: Arc<dyn TaskPlugin>) -> Self {
        self.entries.push(plugin);
        self
    }
}

impl PluginSource for StaticSource {
    fn category(&self) -> Category {
        self.category
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn load(&self) -> Vec<Result<Arc<dyn TaskPlugin>, PluginLoadError>> {
        self.entries.iter().cloned().map(Ok).collect()
    }
}
