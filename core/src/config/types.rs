use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::executor::StrategyKind;
use crate::recovery::DEFAULT_MAX_RETRIES;
use crate::task::TaskContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Firmware image or directory under analysis.
    #[serde(default)]
    pub firmware_path: Option<PathBuf>,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Scratch space; defaults to `<log_dir>/tmp` when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Task names never planned.
    #[serde(default)]
    pub blacklist: Vec<String>,

    #[serde(default)]
    pub emulation: bool,

    /// Re-run analysis over an earlier run's results; skips extraction.
    #[serde(default)]
    pub rescan: bool,

    #[serde(default)]
    pub ai_analysis: bool,

    #[serde(default)]
    pub differential_analysis: bool,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            firmware_path: None,
            log_dir: default_log_dir(),
            output_dir: default_output_dir(),
            temp_dir: None,
            blacklist: Vec::new(),
            emulation: false,
            rescan: false,
            ai_analysis: false,
            differential_analysis: false,
            verbose: false,
            execution: ExecutionConfig::default(),
            recovery: RecoveryConfig::default(),
            monitor: MonitorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationKind {
    /// Dedicated OS thread per task.
    #[default]
    Thread,
    /// `fwpipe worker` child process per task.
    Subprocess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub strategy: StrategyKind,

    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    #[serde(default = "default_max_threads_per_task")]
    pub max_threads_per_task: usize,

    #[serde(default)]
    pub task_timeout_secs: Option<u64>,

    #[serde(default)]
    pub phase_timeout_secs: Option<u64>,

    #[serde(default)]
    pub isolation: IsolationKind,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

fn default_max_parallel_tasks() -> usize {
    num_cpus::get().clamp(1, 4)
}

fn default_max_threads_per_task() -> usize {
    num_cpus::get().max(1) * 2
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            max_parallel_tasks: default_max_parallel_tasks(),
            max_threads_per_task: default_max_threads_per_task(),
            task_timeout_secs: None,
            phase_timeout_secs: None,
            isolation: IsolationKind::default(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    #[default]
    Fixed,
    Adaptive,
}

/// Pool sizing policy. Thresholds are CPU percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default)]
    pub strategy: ConcurrencyMode,
    #[serde(default = "default_min_concurrency")]
    pub min_concurrency: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_base_concurrency")]
    pub base_concurrency: usize,
    #[serde(default = "default_cpu_threshold_low")]
    pub cpu_threshold_low: f32,
    #[serde(default = "default_cpu_threshold_high")]
    pub cpu_threshold_high: f32,
}

fn default_min_concurrency() -> usize {
    1
}

fn default_max_concurrency() -> usize {
    num_cpus::get().max(1)
}

fn default_base_concurrency() -> usize {
    default_max_parallel_tasks()
}

fn default_cpu_threshold_low() -> f32 {
    30.0
}

fn default_cpu_threshold_high() -> f32 {
    80.0
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            strategy: ConcurrencyMode::default(),
            min_concurrency: default_min_concurrency(),
            max_concurrency: default_max_concurrency(),
            base_concurrency: default_base_concurrency(),
            cpu_threshold_low: default_cpu_threshold_low(),
            cpu_threshold_high: default_cpu_threshold_high(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_enabled")]
    pub enabled: bool,

    #[serde(default = "default_monitor_interval_ms")]
    pub interval_ms: u64,
}

fn default_monitor_enabled() -> bool {
    true
}

fn default_monitor_interval_ms() -> u64 {
    1000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitor_enabled(),
            interval_ms: default_monitor_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, also log to `fwpipe.<pid>.log` under `directory`.
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "fwpipe_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Log file directory; falls back to the run's log dir.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Anchor a relative path at the working directory. Left unchanged when the
/// working directory cannot be read.
fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

impl PipelineConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.log_dir.join("tmp"))
    }

    /// Run-wide context every task instance is narrowed from.
    pub fn task_context(&self) -> TaskContext {
        TaskContext {
            firmware_path: self.firmware_path.clone().unwrap_or_default(),
            log_dir: self.log_dir.clone(),
            output_dir: self.output_dir.clone(),
            temp_dir: absolute(self.temp_dir()),
            verbose: self.verbose,
            max_threads: self.execution.max_threads_per_task.max(1),
            timeout_secs: self.execution.task_timeout_secs,
            flags: Default::default(),
        }
    }

    /// Human-readable problems that make a run pointless. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.rescan {
            match &self.firmware_path {
                None => issues.push("firmware path is required".to_string()),
                Some(p) if !p.exists() => {
                    issues.push(format!("firmware path does not exist: {}", p.display()))
                }
                Some(_) => {}
            }
        }
        if self.log_dir.as_os_str().is_empty() {
            issues.push("log directory must not be empty".to_string());
        }
        if self.output_dir.as_os_str().is_empty() {
            issues.push("output directory must not be empty".to_string());
        }

        let exec = &self.execution;
        if exec.max_parallel_tasks == 0 {
            issues.push("execution.max_parallel_tasks must be at least 1".to_string());
        }
        if exec.max_threads_per_task == 0 {
            issues.push("execution.max_threads_per_task must be at least 1".to_string());
        }
        if exec.task_timeout_secs == Some(0) {
            issues.push("execution.task_timeout_secs must be positive".to_string());
        }
        if exec.phase_timeout_secs == Some(0) {
            issues.push("execution.phase_timeout_secs must be positive".to_string());
        }

        let cc = &exec.concurrency;
        if cc.min_concurrency == 0 || cc.min_concurrency > cc.max_concurrency {
            issues.push(format!(
                "execution.concurrency bounds are invalid: min {} max {}",
                cc.min_concurrency, cc.max_concurrency
            ));
        }
        if cc.cpu_threshold_low >= cc.cpu_threshold_high {
            issues.push("execution.concurrency.cpu_threshold_low must be below cpu_threshold_high".to_string());
        }

        if self.recovery.backoff_factor < 1.0 || !self.recovery.backoff_factor.is_finite() {
            issues.push(format!(
                "recovery.backoff_factor must be >= 1 (got {})",
                self.recovery.backoff_factor
            ));
        }
        if self.monitor.enabled && self.monitor.interval_ms == 0 {
            issues.push("monitor.interval_ms must be positive".to_string());
        }

        issues
    }
}
