//! Built-in tasks, the subprocess isolation backend and the factory that
//! turns a `PipelineConfig` into concrete executor parts.

pub mod executor;
pub mod factory;
pub mod preflight;
pub mod tasks;
