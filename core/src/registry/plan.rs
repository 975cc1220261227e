use serde::Serialize;

use super::{Category, ModuleRegistry, TaskDescriptor};

/// Parallel/sequential partition of one category's runnable tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub parallel: Vec<TaskDescriptor>,
    pub sequential: Vec<TaskDescriptor>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.parallel.is_empty() && self.sequential.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parallel.len() + self.sequential.len()
    }

    /// Every planned name, parallel group first.
    pub fn task_names(&self) -> Vec<String> {
        self.parallel
            .iter()
            .chain(self.sequential.iter())
            .map(|d| d.name.clone())
            .collect()
    }
}

/// Build the plan for `category`. An empty plan is a normal outcome.
pub fn plan(registry: &ModuleRegistry, category: Category, blacklist: &[String]) -> ExecutionPlan {
    let (mut parallel, mut sequential): (Vec<_>, Vec<_>) = registry
        .list(Some(category), blacklist)
        .into_iter()
        .cloned()
        .partition(|d| d.parallel);

    sort_by_priority(&mut parallel);
    sort_by_priority(&mut sequential);

    tracing::debug!(
        "plan for {}: {} parallel, {} sequential",
        category,
        parallel.len(),
        sequential.len()
    );
    ExecutionPlan {
        parallel,
        sequential,
    }
}

fn sort_by_priority(tasks: &mut [TaskDescriptor]) {
    tasks.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{StaticSource, Task, TaskContext, TaskFault, TaskLogger, TaskMetadata, TaskPlugin};
    use std::sync::Arc;

    struct Noop;
    impl Task for Noop {
        fn run(&mut self) -> Result<i32, TaskFault> {
            Ok(0)
        }
    }

    struct Plugin(TaskMetadata);
    impl TaskPlugin for Plugin {
        fn metadata(&self) -> TaskMetadata {
            self.0.clone()
        }
        fn create(&self, _ctx: &TaskContext, _log: TaskLogger) -> Box<dyn Task> {
            Box::new(Noop)
        }
    }

    fn registry() -> ModuleRegistry {
        let metas = [
            TaskMetadata::new("P60_deep"),
            TaskMetadata::new("P50_b"),
            TaskMetadata::new("P50_a"),
            TaskMetadata::new("P99_prepare").sequential(),
            TaskMetadata::new("P02_check").sequential(),
            TaskMetadata::new("P70_off").disabled(),
        ];
        let source = metas.into_iter().fold(
            StaticSource::new(Category::Extraction, "test"),
            |src, meta| src.with(Arc::new(Plugin(meta))),
        );
        let mut registry = ModuleRegistry::with_sources(vec![Box::new(source)]);
        registry.discover();
        registry
    }

    #[test]
    fn groups_are_partitioned_and_sorted() {
        let plan = plan(&registry(), Category::Extraction, &["P60_deep".to_string()]);
        let names = |group: &[TaskDescriptor]| group.iter().map(|d| d.name.clone()).collect::<Vec<_>>();

        assert_eq!(names(&plan.parallel), vec!["P50_a", "P50_b"]);
        assert_eq!(names(&plan.sequential), vec!["P02_check", "P99_prepare"]);
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn empty_category_yields_empty_plan() {
        let plan = plan(&registry(), Category::Reporting, &[]);
        assert!(plan.is_empty());
        assert_eq!(plan, ExecutionPlan::default());
    }
}
