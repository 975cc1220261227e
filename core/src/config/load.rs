use std::path::{Path, PathBuf};

use super::types::PipelineConfig;
use crate::error::ConfigError;

pub const ENV_STRATEGY: &str = "FWPIPE_STRATEGY";
pub const ENV_MAX_PARALLEL: &str = "FWPIPE_MAX_PARALLEL";
pub const ENV_LOG_LEVEL: &str = "FWPIPE_LOG_LEVEL";

/// Get the default fwpipe data directory: ~/.fwpipe
pub fn get_fwpipe_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".fwpipe"))
}

pub fn read_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<PipelineConfig>(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// First existing file among the default locations.
fn default_config_path() -> Option<PathBuf> {
    // Priority 1: ~/.fwpipe/config.toml
    if let Ok(dir) = get_fwpipe_data_dir() {
        let user = dir.join("config.toml");
        if user.is_file() {
            return Some(user);
        }
    }
    // Priority 2: ./fwpipe.toml
    let local = PathBuf::from("fwpipe.toml");
    local.is_file().then_some(local)
}

/// Load configuration: an explicit path must exist; otherwise the default
/// locations are tried, then built-in defaults. Environment overrides are
/// applied last.
pub fn load(explicit: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let mut cfg = match explicit {
        Some(path) => read_config(path)?,
        None => match default_config_path() {
            Some(path) => {
                tracing::debug!("loading config from {}", path.display());
                read_config(&path)?
            }
            None => PipelineConfig::default(),
        },
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

pub fn apply_env_overrides(
    cfg: &mut PipelineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var(ENV_STRATEGY) {
        cfg.execution.strategy = v.parse().map_err(|_| ConfigError::Env {
            key: ENV_STRATEGY.to_string(),
            value: v.clone(),
        })?;
    }
    if let Some(v) = var(ENV_MAX_PARALLEL) {
        cfg.execution.max_parallel_tasks = v.trim().parse().map_err(|_| ConfigError::Env {
            key: ENV_MAX_PARALLEL.to_string(),
            value: v.clone(),
        })?;
    }
    if let Some(v) = var(ENV_LOG_LEVEL) {
        cfg.logging.level = v.trim().to_string();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StrategyKind;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_path_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "rescan = true\n[execution]\nstrategy = \"sequential\"\n").unwrap();

        let cfg = read_config(&path).unwrap();
        assert!(cfg.rescan);
        assert_eq!(cfg.execution.strategy, StrategyKind::Sequential);
    }

    #[test]
    fn missing_or_broken_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(load(Some(&missing)), Err(ConfigError::Read { .. })));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[execution\n").unwrap();
        assert!(matches!(read_config(&broken), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = PipelineConfig::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                (ENV_STRATEGY, "isolated"),
                (ENV_MAX_PARALLEL, " 3 "),
                (ENV_LOG_LEVEL, "debug"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.execution.strategy, StrategyKind::IsolatedPool);
        assert_eq!(cfg.execution.max_parallel_tasks, 3);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut cfg = PipelineConfig::default();
        let err = apply_env_overrides(&mut cfg, env(&[(ENV_MAX_PARALLEL, "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref key, .. } if key == ENV_MAX_PARALLEL));

        // Blank values are ignored.
        apply_env_overrides(&mut cfg, env(&[(ENV_STRATEGY, "  ")])).unwrap();
        assert_eq!(cfg.execution.strategy, StrategyKind::BoundedPool);
    }
}
