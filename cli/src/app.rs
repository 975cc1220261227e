use std::path::PathBuf;
use std::sync::Arc;

use fwpipe_core::api::{
    plan, Category, CliError, ConfigError, ModuleRegistry, PipelineConfig, PipelineController,
    PipelineOptions, RunReport, ShutdownSignal,
};
use fwpipe_plugins::{factory, preflight};

use crate::commands::cli::RunArgs;
use crate::signals::spawn_signal_listener;

pub const REPORT_FILE: &str = "fwpipe_report.json";

/// Command-line flags win over the config file and the environment.
pub fn apply_run_args(cfg: &mut PipelineConfig, args: &RunArgs) {
    if let Some(firmware) = &args.firmware {
        cfg.firmware_path = Some(firmware.clone());
    }
    if let Some(dir) = &args.log_dir {
        cfg.log_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        cfg.output_dir = dir.clone();
    }
    if let Some(strategy) = args.strategy {
        cfg.execution.strategy = strategy;
    }
    if let Some(n) = args.max_parallel {
        cfg.execution.max_parallel_tasks = n;
    }
    if let Some(isolation) = args.isolation {
        cfg.execution.isolation = isolation;
    }
    for name in &args.blacklist {
        if !cfg.blacklist.contains(name) {
            cfg.blacklist.push(name.clone());
        }
    }
    cfg.emulation |= args.emulation;
    cfg.rescan |= args.rescan;
    cfg.verbose |= args.verbose;
}

fn prepare_dirs(cfg: &PipelineConfig) -> Result<(), CliError> {
    for dir in [&cfg.log_dir, &cfg.output_dir, &cfg.temp_dir()] {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub async fn run_pipeline(cfg: PipelineConfig, json: bool) -> Result<i32, CliError> {
    let issues = cfg.validate();
    if !issues.is_empty() {
        return Err(ConfigError::Invalid(issues).into());
    }
    prepare_dirs(&cfg)?;
    if !cfg.rescan {
        preflight::check_external_tools(&cfg.blacklist);
    }

    let registry = Arc::new(factory::build_registry());
    let errors = Arc::new(factory::build_error_handler(&cfg.recovery, ShutdownSignal::new()));
    let signals = spawn_signal_listener(errors.clone());
    let monitor = factory::build_monitor(&cfg);
    let executor = factory::build_executor(&cfg, registry.clone(), errors, monitor.clone())?;

    let mut controller =
        PipelineController::new(registry, executor, PipelineOptions::from_config(&cfg));
    if let Some(monitor) = monitor {
        controller = controller.with_monitor(monitor);
    }

    let report = controller.run_pipeline().await;
    signals.abort();

    let path = write_report(&report, &cfg.log_dir)?;
    if json {
        let body = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::Command(format!("cannot encode run report: {e}")))?;
        println!("{body}");
    } else {
        for line in summary_lines(&report) {
            println!("{line}");
        }
        println!("report: {}", path.display());
    }
    Ok(report.exit_code)
}

fn write_report(report: &RunReport, log_dir: &std::path::Path) -> Result<PathBuf, CliError> {
    let path = log_dir.join(REPORT_FILE);
    let body = serde_json::to_vec_pretty(report)
        .map_err(|e| CliError::Command(format!("cannot encode run report: {e}")))?;
    std::fs::write(&path, body)?;
    Ok(path)
}

pub fn summary_lines(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.phases.len() + 2);
    lines.push(format!("run {}: {}", report.run_id, report.outcome));
    for phase in &report.phases {
        if phase.ran {
            lines.push(format!(
                "  {:<22} {} completed, {} failed, {} skipped ({}ms){}",
                phase.category.label(),
                phase.completed,
                phase.failed,
                phase.skipped,
                phase.duration_ms,
                if phase.deadline_hit { ", deadline hit" } else { "" }
            ));
        } else {
            lines.push(format!(
                "  {:<22} skipped: {}",
                phase.category.label(),
                phase.skip_reason.as_deref().unwrap_or("-")
            ));
        }
    }
    if let Some(reason) = &report.abort_reason {
        lines.push(format!("aborted: {reason}"));
    }
    lines
}

pub fn render_list(registry: &ModuleRegistry, category: Option<Category>) -> Vec<String> {
    registry
        .descriptors()
        .filter(|d| category.map_or(true, |c| d.category == c))
        .map(|d| {
            let mut flags = vec![if d.parallel { "parallel" } else { "sequential" }];
            if !d.enabled {
                flags.push("disabled");
            }
            let mut line = format!(
                "{:<24} {:<22} {:>3}  {:<20} {}",
                d.name,
                d.category.label(),
                d.priority,
                flags.join(","),
                d.description
            );
            if let Some(fb) = &d.fallback {
                line.push_str(&format!(" (fallback: {fb})"));
            }
            line
        })
        .collect()
}

pub fn render_plan(registry: &ModuleRegistry, category: Category, blacklist: &[String]) -> Vec<String> {
    let plan = plan(registry, category, blacklist);
    if plan.is_empty() {
        return vec![format!("{}: nothing to run", category.label())];
    }
    let mut lines = vec![format!("{}: {} task(s)", category.label(), plan.len())];
    for (label, group) in [("parallel", &plan.parallel), ("sequential", &plan.sequential)] {
        if group.is_empty() {
            continue;
        }
        lines.push(format!("  {label}:"));
        for d in group.iter() {
            lines.push(format!("    {:>3}  {}", d.priority, d.name));
        }
    }
    lines
}

pub fn list(category: Option<Category>) -> Result<i32, CliError> {
    let registry = factory::build_registry();
    for line in render_list(&registry, category) {
        println!("{line}");
    }
    Ok(0)
}

pub fn show_plan(cfg: &PipelineConfig, category: Category) -> Result<i32, CliError> {
    let registry = factory::build_registry();
    for line in render_plan(&registry, category, &cfg.blacklist) {
        println!("{line}");
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwpipe_core::api::StrategyKind;

    #[test]
    fn flags_override_config() {
        let mut cfg = PipelineConfig {
            blacklist: vec!["S05_firmware_details".into()],
            ..PipelineConfig::default()
        };
        let args = RunArgs {
            firmware: Some(PathBuf::from("fw.bin")),
            strategy: Some(StrategyKind::Sequential),
            max_parallel: Some(2),
            blacklist: vec!["S05_firmware_details".into(), "F50_output_index".into()],
            rescan: true,
            ..RunArgs::default()
        };

        apply_run_args(&mut cfg, &args);

        assert_eq!(cfg.firmware_path, Some(PathBuf::from("fw.bin")));
        assert_eq!(cfg.execution.strategy, StrategyKind::Sequential);
        assert_eq!(cfg.execution.max_parallel_tasks, 2);
        assert_eq!(cfg.blacklist, vec!["S05_firmware_details", "F50_output_index"]);
        assert!(cfg.rescan);
        assert_eq!(cfg.log_dir, PathBuf::from("./logs"));
    }

    #[test]
    fn list_marks_disabled_and_fallbacks() {
        let registry = factory::build_registry();
        let lines = render_list(&registry, Some(Category::Extraction));

        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("P50_binwalk_extractor"));
        assert!(lines[1].contains("(fallback: P55_unblob_extractor)"));
        assert!(lines[2].contains("disabled"));
        assert!(lines[3].contains("sequential"));
    }

    #[test]
    fn plan_groups_by_mode() {
        let registry = factory::build_registry();
        let lines = render_plan(&registry, Category::Extraction, &[]);
        assert_eq!(
            lines,
            vec![
                "extraction: 3 task(s)".to_string(),
                "  parallel:".to_string(),
                "      1  P01_firmware_check".to_string(),
                "     50  P50_binwalk_extractor".to_string(),
                "  sequential:".to_string(),
                "     99  P99_prepare_analyzer".to_string(),
            ]
        );

        let empty = render_plan(&registry, Category::LiveEmulation, &[]);
        assert_eq!(empty, vec!["live-emulation: nothing to run".to_string()]);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_running() {
        let cfg = PipelineConfig::default();
        let err = run_pipeline(cfg, false).await.unwrap_err();
        assert_eq!(err.exit_code(), 11);
    }
}
