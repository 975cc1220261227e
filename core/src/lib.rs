pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod pipeline;
pub mod recovery;
pub mod registry;
pub mod shutdown;
pub mod task;
pub mod util;
