//! The task contract: what every pluggable analysis unit implements, the
//! context it is built with, and the logger it writes through.

mod context;
mod fault;
mod logger;
mod traits;

pub use context::TaskContext;
pub use fault::{TaskFault, WireFault};
pub use logger::{LogLevel, LogSink, NullSink, SectionMarker, TaskLogger, TracingSink};
pub use traits::{PluginLoadError, PluginSource, StaticSource, Task, TaskMetadata, TaskPlugin};
