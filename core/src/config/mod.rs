mod load;
mod types;

pub use load::{
    apply_env_overrides, get_fwpipe_data_dir, load, read_config, ENV_LOG_LEVEL, ENV_MAX_PARALLEL,
    ENV_STRATEGY,
};
pub use types::{
    ConcurrencyConfig, ConcurrencyMode, ExecutionConfig, IsolationKind, LoggingConfig,
    MonitorConfig, PipelineConfig, RecoveryConfig,
};
