use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("executor error: {0}")]
    Executor(#[from] super::ExecutorError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit code for an error that escaped the run.
    ///
    /// 11 config, 20 io / command start, 50 internal. Critical aborts are not
    /// errors here; they come back from the pipeline as exit code 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 11,
            Self::Registry(_) => 50,
            Self::Executor(super::ExecutorError::Spawn(_)) => 20,
            Self::Io(_) | Self::Command(_) => 20,
            Self::Anyhow(_) => 50,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    Env { key: String, value: String },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("invalid task name: '{0}'")]
    InvalidName(String),
    #[error("task '{0}' is already registered")]
    DuplicateTask(String),
    #[error("unknown task: {0}")]
    UnknownTask(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(CliError::from(ConfigError::Invalid(vec!["x".into()])).exit_code(), 11);
        assert_eq!(
            CliError::from(std::io::Error::other("disk")).exit_code(),
            20
        );
        assert_eq!(
            CliError::from(RegistryError::UnknownTask("P01".into())).exit_code(),
            50
        );
        assert_eq!(
            CliError::from(crate::error::ExecutorError::Spawn("no exe".into())).exit_code(),
            20
        );
    }

    #[test]
    fn invalid_config_lists_every_issue() {
        let err = ConfigError::Invalid(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "invalid configuration: a; b");
    }
}
