//! Child side of subprocess isolation: `fwpipe worker --task <name>`.

use std::sync::Arc;

use fwpipe_core::api::{CliError, RegistryError, TracingSink};
use fwpipe_plugins::executor::{context_from_env, run_worker};
use fwpipe_plugins::factory::build_registry;

/// Run one task and print its result line on stdout. The exit code is 0
/// whenever a result line was printed; the task's own status travels in it.
pub fn run(task: &str) -> Result<i32, CliError> {
    let registry = build_registry();
    if registry.get(task).is_none() {
        return Err(RegistryError::UnknownTask(task.to_string()).into());
    }
    let context = context_from_env()?;
    tracing::debug!(task = %task, "worker starting");

    let report = run_worker(&registry, task, &context, Arc::new(TracingSink));
    let line = report
        .to_line()
        .map_err(|e| CliError::Command(format!("cannot encode worker result: {e}")))?;
    println!("{line}");
    Ok(0)
}
