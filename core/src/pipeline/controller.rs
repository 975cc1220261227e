use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::report::{PhaseReport, RunOutcome, RunReport};
use crate::config::PipelineConfig;
use crate::executor::{Executor, RunSummary, StrategyKind, TaskResult, TaskStatus};
use crate::monitor::ResourceMonitor;
use crate::recovery::ErrorHandler;
use crate::registry::{self, Category, ExecutionPlan, ModuleRegistry, TaskDescriptor};
use crate::task::{LogSink, SectionMarker};

/// Knobs of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Strategy of the parallel group of each phase.
    pub strategy: StrategyKind,
    pub max_parallel: usize,
    pub task_timeout: Option<Duration>,
    /// No new dispatches once a phase has run this long.
    pub phase_timeout: Option<Duration>,
    pub blacklist: Vec<String>,
    pub emulation: bool,
    pub rescan: bool,
    pub ai_analysis: bool,
    pub differential_analysis: bool,
    pub monitor_interval: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            max_parallel: 1,
            task_timeout: None,
            phase_timeout: None,
            blacklist: Vec::new(),
            emulation: false,
            rescan: false,
            ai_analysis: false,
            differential_analysis: false,
            monitor_interval: Duration::from_secs(1),
        }
    }
}

impl PipelineOptions {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        let exec = &cfg.execution;
        Self {
            strategy: exec.strategy,
            max_parallel: exec.max_parallel_tasks.max(1),
            task_timeout: exec.task_timeout_secs.map(Duration::from_secs),
            phase_timeout: exec.phase_timeout_secs.map(Duration::from_secs),
            blacklist: cfg.blacklist.clone(),
            emulation: cfg.emulation,
            rescan: cfg.rescan,
            ai_analysis: cfg.ai_analysis,
            differential_analysis: cfg.differential_analysis,
            monitor_interval: Duration::from_millis(cfg.monitor.interval_ms.max(1)),
        }
    }
}

/// Sequences categories into phases, gates analysis on extraction and
/// aggregates the run report.
pub struct PipelineController {
    registry: Arc<ModuleRegistry>,
    executor: Executor,
    monitor: Option<Arc<ResourceMonitor>>,
    options: PipelineOptions,
}

impl PipelineController {
    pub fn new(registry: Arc<ModuleRegistry>, executor: Executor, options: PipelineOptions) -> Self {
        Self {
            registry,
            executor,
            monitor: None,
            options,
        }
    }

    /// Sample resources for the duration of `run_pipeline`.
    pub fn with_monitor(mut self, monitor: Arc<ResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    fn errors(&self) -> &Arc<ErrorHandler> {
        self.executor.invoker().errors()
    }

    fn sink(&self) -> &Arc<dyn LogSink> {
        self.executor.invoker().sink()
    }

    pub fn plan(&self, category: Category) -> ExecutionPlan {
        registry::plan(&self.registry, category, &self.options.blacklist)
    }

    pub fn summary(&self) -> RunSummary {
        self.executor.summary()
    }

    pub fn results(&self) -> BTreeMap<String, TaskResult> {
        self.executor.results().snapshot()
    }

    /// Run every planned task of `category`: the parallel group under the
    /// configured strategy, then the sequential group under Sequential.
    /// Emulation and reporting run entirely under Sequential.
    pub async fn run_phase(&self, category: Category) -> PhaseReport {
        if let Some(reason) = self.abort_reason() {
            return self.skip_phase(category, format!("aborted: {reason}"));
        }

        let plan = self.plan(category);
        let names = plan.task_names();
        self.sink().section(&SectionMarker::PhaseStart {
            category,
            planned: plan.len(),
        });

        let start = Instant::now();
        let stop = self.errors().shutdown().child_token();
        let deadline = self.options.phase_timeout.map(|limit| arm_deadline(limit, stop.clone()));

        let mut results = BTreeMap::new();
        if runs_sequential_only(category) {
            let ordered = in_priority_order(&plan);
            results.extend(self.dispatch(&ordered, StrategyKind::Sequential, &stop).await);
        } else {
            results.extend(
                self.dispatch(&plan.parallel, self.options.strategy, &stop)
                    .await,
            );
            results.extend(
                self.dispatch(&plan.sequential, StrategyKind::Sequential, &stop)
                    .await,
            );
        }

        let deadline_hit = match deadline {
            Some(handle) => {
                handle.abort();
                stop.is_cancelled() && !self.errors().shutdown().is_triggered()
            }
            None => false,
        };
        if deadline_hit {
            tracing::warn!(
                "phase {} reached its deadline; no further tasks dispatched",
                category
            );
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let mut report = PhaseReport::from_results(category, names, &results, duration_ms)
            .with_outputs(&results, &self.registry);
        report.deadline_hit = deadline_hit;

        for result in results.values().filter(|r| r.status == TaskStatus::Failed) {
            tracing::warn!(
                task = %result.task,
                exit_code = result.exit_code,
                "{} failed: {}",
                result.task,
                result.error.as_deref().unwrap_or("non-zero exit")
            );
        }

        self.sink().section(&SectionMarker::PhaseEnd {
            category,
            duration_ms,
            failed: report.failed,
        });
        report
    }

    async fn dispatch(
        &self,
        tasks: &[TaskDescriptor],
        kind: StrategyKind,
        stop: &CancellationToken,
    ) -> BTreeMap<String, TaskResult> {
        if tasks.is_empty() {
            return BTreeMap::new();
        }
        let mut opts = self
            .executor
            .dispatch_options(Some(self.options.max_parallel), self.options.task_timeout);
        opts.stop = stop.clone();
        self.executor.execute_with(tasks, kind, &opts).await
    }

    fn skip_phase(&self, category: Category, reason: impl Into<String>) -> PhaseReport {
        let reason = reason.into();
        self.sink().section(&SectionMarker::PhaseSkipped {
            category,
            reason: reason.clone(),
        });
        PhaseReport::skipped(category, reason)
    }

    fn abort_reason(&self) -> Option<String> {
        let shutdown = self.errors().shutdown();
        if shutdown.is_triggered() || self.errors().is_critical() {
            Some(
                shutdown
                    .reason()
                    .unwrap_or_else(|| "critical error".to_string()),
            )
        } else {
            None
        }
    }

    /// Extraction -> (gate) -> security analysis -> emulation -> AI ->
    /// differential -> reporting.
    pub async fn run_pipeline(&self) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        self.sink().section(&SectionMarker::RunStart {
            run_id: run_id.clone(),
        });

        if let Some(monitor) = &self.monitor {
            let cancel = self.errors().shutdown().child_token();
            if let Err(e) = monitor.start_until(self.options.monitor_interval, cancel) {
                tracing::warn!("resource monitor failed to start: {}", e);
            }
        }

        let mut phases = Vec::new();
        let opts = &self.options;

        if opts.rescan {
            for category in [
                Category::Extraction,
                Category::SecurityAnalysis,
                Category::LiveEmulation,
                Category::AiAnalysis,
                Category::DifferentialAnalysis,
            ] {
                phases.push(self.skip_phase(category, "rescan mode"));
            }
        } else {
            let extraction = self.run_phase(Category::Extraction).await;
            let gate_open = extraction.produced_output();
            phases.push(extraction);

            let gated = |enabled: bool, off_reason: &str| -> Result<(), String> {
                if !gate_open {
                    Err("extraction produced no usable output".to_string())
                } else if !enabled {
                    Err(off_reason.to_string())
                } else {
                    Ok(())
                }
            };

            let optional = [
                (Category::SecurityAnalysis, true, ""),
                (Category::LiveEmulation, opts.emulation, "emulation disabled"),
                (Category::AiAnalysis, opts.ai_analysis, "AI analysis disabled"),
                (
                    Category::DifferentialAnalysis,
                    opts.differential_analysis,
                    "differential analysis disabled",
                ),
            ];
            for (category, enabled, off_reason) in optional {
                let report = match gated(enabled, off_reason) {
                    Ok(()) => self.run_phase(category).await,
                    Err(reason) => self.skip_phase(category, reason),
                };
                phases.push(report);
            }
        }

        phases.push(self.run_phase(Category::Reporting).await);

        if let Some(monitor) = &self.monitor {
            let monitor = monitor.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || monitor.stop()).await {
                tracing::warn!("resource monitor failed to stop: {}", e);
            }
        }

        let summary = self.summary();
        let abort_reason = self.abort_reason();
        let outcome = if abort_reason.is_some() {
            RunOutcome::Aborted
        } else if summary.failed > 0 {
            RunOutcome::CompletedWithFailures
        } else {
            RunOutcome::Succeeded
        };
        let exit_code = outcome.exit_code();

        match outcome {
            RunOutcome::Aborted => tracing::error!(
                "Run {} aborted: {}",
                run_id,
                abort_reason.as_deref().unwrap_or_default()
            ),
            _ => tracing::info!(
                "Run {} {}: {} completed, {} failed, {} skipped",
                run_id,
                outcome,
                summary.completed,
                summary.failed,
                summary.skipped
            ),
        }
        self.sink().section(&SectionMarker::RunEnd {
            run_id: run_id.clone(),
            exit_code,
        });

        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            phases,
            summary,
            errors: self.errors().summary(),
            resources: self.monitor.as_ref().map(|m| m.summary()),
            outcome,
            abort_reason,
            exit_code,
        }
    }
}

fn runs_sequential_only(category: Category) -> bool {
    matches!(category, Category::LiveEmulation | Category::Reporting)
}

fn in_priority_order(plan: &ExecutionPlan) -> Vec<TaskDescriptor> {
    let mut all: Vec<TaskDescriptor> = plan
        .parallel
        .iter()
        .chain(plan.sequential.iter())
        .cloned()
        .collect();
    all.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
    all
}

fn arm_deadline(limit: Duration, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(limit) => stop.cancel(),
            _ = stop.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskMetadata;

    fn descriptor(name: &str, sequential: bool) -> TaskDescriptor {
        let mut meta = TaskMetadata::new(name);
        if sequential {
            meta = meta.sequential();
        }
        TaskDescriptor::from_metadata(meta, Category::Reporting, "")
    }

    #[test]
    fn reporting_order_merges_groups_by_priority() {
        let plan = ExecutionPlan {
            parallel: vec![descriptor("F10_b", false), descriptor("F50_d", false)],
            sequential: vec![descriptor("F05_a", true), descriptor("F20_c", true)],
        };
        let names: Vec<String> = in_priority_order(&plan).into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["F05_a", "F10_b", "F20_c", "F50_d"]);
    }

    #[test]
    fn options_follow_config() {
        let mut cfg = PipelineConfig::default();
        cfg.execution.task_timeout_secs = Some(30);
        cfg.execution.max_parallel_tasks = 3;
        cfg.rescan = true;
        let opts = PipelineOptions::from_config(&cfg);
        assert_eq!(opts.task_timeout, Some(Duration::from_secs(30)));
        assert_eq!(opts.max_parallel, 3);
        assert!(opts.rescan);
        assert_eq!(opts.phase_timeout, None);
    }

    #[test]
    fn emulation_and_reporting_are_sequential() {
        assert!(runs_sequential_only(Category::LiveEmulation));
        assert!(runs_sequential_only(Category::Reporting));
        assert!(!runs_sequential_only(Category::Extraction));
    }
}
