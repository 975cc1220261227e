//! Background resource sampling for the duration of a run.

#[allow(clippy::module_inception)]
mod monitor;
mod sampler;

pub use monitor::{ResourceMonitor, ResourceSummary, DEFAULT_SAMPLE_CAPACITY};
pub use sampler::{ResourceSample, ResourceSampler, SysinfoSampler};
