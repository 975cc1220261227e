#[allow(clippy::module_inception)]
pub mod error;
pub mod executor;

pub use error::{CliError, ConfigError, RegistryError};
pub use executor::{ExecutorError, MonitorError, RecoveryError};
