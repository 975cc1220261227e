use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{RunSummary, TaskResult};

/// Results map keyed by task name, shared by every worker of a run.
/// Only terminal results are stored.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    inner: Arc<Mutex<BTreeMap<String, TaskResult>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, BTreeMap<String, TaskResult>> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns false (and stores nothing) for a non-terminal result.
    pub fn insert(&self, result: TaskResult) -> bool {
        if !result.status.is_terminal() {
            tracing::debug!(task = %result.task, "refusing to store {} result", result.status);
            return false;
        }
        self.guard().insert(result.task.clone(), result);
        true
    }

    pub fn extend(&self, results: impl IntoIterator<Item = TaskResult>) {
        for r in results {
            self.insert(r);
        }
    }

    pub fn get(&self, task: &str) -> Option<TaskResult> {
        self.guard().get(task).cloned()
    }

    pub fn contains(&self, task: &str) -> bool {
        self.guard().contains_key(task)
    }

    /// Copy of the entries for the given names that are present.
    pub fn select(&self, names: &[String]) -> BTreeMap<String, TaskResult> {
        let g = self.guard();
        names
            .iter()
            .filter_map(|n| g.get(n).map(|r| (n.clone(), r.clone())))
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, TaskResult> {
        self.guard().clone()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(self.guard().values())
    }
}
