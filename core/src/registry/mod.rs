//! Task discovery, the descriptor store, and the per-category planner.

mod descriptor;
mod plan;
#[allow(clippy::module_inception)]
mod registry;

pub use descriptor::{priority_from_name, Category, TaskDescriptor, DEFAULT_PRIORITY};
pub use plan::{plan, ExecutionPlan};
pub use registry::{ModuleRegistry, RegisteredTask};
