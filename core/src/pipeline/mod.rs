//! Phase sequencing and the run report.

mod controller;
mod report;

pub use controller::{PipelineController, PipelineOptions};
pub use report::{PhaseReport, RunOutcome, RunReport, ABORT_EXIT_CODE};
