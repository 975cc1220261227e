mod common;

use std::time::Duration;

use common::{executor, handler, registry, Scripted, Step};
use fwpipe_core::executor::{StrategyKind, TaskStatus};
use fwpipe_core::pipeline::{PipelineController, PipelineOptions, RunOutcome};
use fwpipe_core::registry::Category;
use fwpipe_core::task::{TaskFault, TaskMetadata};
use pretty_assertions::assert_eq;

const FAST: Duration = Duration::from_millis(1);

fn options() -> PipelineOptions {
    PipelineOptions {
        strategy: StrategyKind::BoundedPool,
        max_parallel: 2,
        ..PipelineOptions::default()
    }
}

#[tokio::test]
async fn full_run_visits_every_enabled_phase() {
    let check = Scripted::named("P01_check");
    let prepare = Scripted::new(
        TaskMetadata::new("P99_prepare")
            .sequential()
            .produces_output(),
    );
    let details = Scripted::named("S05_details");
    let emulate = Scripted::named("L10_emulate");
    let index = Scripted::new(TaskMetadata::new("F50_index").sequential());
    let reg = registry(&[
        (&check, Category::Extraction),
        (&prepare, Category::Extraction),
        (&details, Category::SecurityAnalysis),
        (&emulate, Category::LiveEmulation),
        (&index, Category::Reporting),
    ]);
    let controller = PipelineController::new(
        reg.clone(),
        executor(reg, handler(FAST)),
        PipelineOptions {
            emulation: true,
            ..options()
        },
    );

    let report = controller.run_pipeline().await;

    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert_eq!(report.exit_code, 0);
    let order: Vec<Category> = report.phases.iter().map(|p| p.category).collect();
    assert_eq!(
        order,
        vec![
            Category::Extraction,
            Category::SecurityAnalysis,
            Category::LiveEmulation,
            Category::AiAnalysis,
            Category::DifferentialAnalysis,
            Category::Reporting,
        ]
    );
    assert!(report.phase(Category::LiveEmulation).unwrap().ran);
    assert!(!report.phase(Category::AiAnalysis).unwrap().ran);
    assert_eq!(report.summary.completed, 5);
    assert_eq!(details.runs(), 1);
    assert_eq!(index.runs(), 1);
    // Emulation always runs sequentially.
    assert_eq!(controller.results()["L10_emulate"].worker.as_deref(), Some("seq-0"));
}

#[tokio::test]
async fn failed_extraction_closes_the_gate() {
    let extract = Scripted::new(TaskMetadata::new("P50_extract").produces_output()).exits(&[127]);
    let details = Scripted::named("S05_details");
    let index = Scripted::named("F50_index");
    let reg = registry(&[
        (&extract, Category::Extraction),
        (&details, Category::SecurityAnalysis),
        (&index, Category::Reporting),
    ]);
    let controller = PipelineController::new(reg.clone(), executor(reg, handler(FAST)), options());

    let report = controller.run_pipeline().await;

    let security = report.phase(Category::SecurityAnalysis).unwrap();
    assert!(!security.ran);
    assert_eq!(
        security.skip_reason.as_deref(),
        Some("extraction produced no usable output")
    );
    assert_eq!(details.runs(), 0);
    // Reporting still runs and ordinary failures keep the exit code at 0.
    assert_eq!(index.runs(), 1);
    assert_eq!(report.outcome, RunOutcome::CompletedWithFailures);
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.phase(Category::Extraction).unwrap().exit_codes["P50_extract"], 127);
}

#[tokio::test]
async fn rescan_only_reports() {
    let extract = Scripted::named("P50_extract");
    let details = Scripted::named("S05_details");
    let index = Scripted::named("F50_index");
    let reg = registry(&[
        (&extract, Category::Extraction),
        (&details, Category::SecurityAnalysis),
        (&index, Category::Reporting),
    ]);
    let controller = PipelineController::new(
        reg.clone(),
        executor(reg, handler(FAST)),
        PipelineOptions {
            rescan: true,
            ..options()
        },
    );

    let report = controller.run_pipeline().await;

    assert_eq!(extract.runs(), 0);
    assert_eq!(details.runs(), 0);
    assert_eq!(index.runs(), 1);
    let skipped: Vec<_> = report.phases.iter().filter(|p| !p.ran).collect();
    assert_eq!(skipped.len(), 5);
    assert!(skipped.iter().all(|p| p.skip_reason.as_deref() == Some("rescan mode")));
    assert_eq!(report.outcome, RunOutcome::Succeeded);
}

#[tokio::test]
async fn passing_check_alone_keeps_the_gate_closed() {
    let check = Scripted::named("P01_check");
    let extract = Scripted::new(TaskMetadata::new("P50_extract").produces_output()).exits(&[127]);
    let prepare = Scripted::new(
        TaskMetadata::new("P99_prepare")
            .sequential()
            .produces_output(),
    )
    .exits(&[1]);
    let details = Scripted::named("S05_details");
    let reg = registry(&[
        (&check, Category::Extraction),
        (&extract, Category::Extraction),
        (&prepare, Category::Extraction),
        (&details, Category::SecurityAnalysis),
    ]);
    let controller = PipelineController::new(reg.clone(), executor(reg, handler(FAST)), options());

    let report = controller.run_pipeline().await;

    let extraction = report.phase(Category::Extraction).unwrap();
    assert_eq!((extraction.completed, extraction.failed), (1, 2));
    assert!(extraction.outputs.is_empty());
    assert!(!report.phase(Category::SecurityAnalysis).unwrap().ran);
    assert_eq!(details.runs(), 0);
}

#[tokio::test]
async fn critical_error_aborts_remaining_phases() {
    let extract = Scripted::new(TaskMetadata::new("P50_extract").produces_output());
    let fatal = Scripted::named("S10_fatal").steps(vec![Step::Fault(|| {
        TaskFault::Interrupted("SIGINT".into())
    })]);
    let index = Scripted::named("F50_index");
    let reg = registry(&[
        (&extract, Category::Extraction),
        (&fatal, Category::SecurityAnalysis),
        (&index, Category::Reporting),
    ]);
    let errors = handler(FAST);
    let controller = PipelineController::new(reg.clone(), executor(reg, errors.clone()), options());

    let report = controller.run_pipeline().await;

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.exit_code, 1);
    assert!(errors.shutdown().is_triggered());
    assert_eq!(index.runs(), 0);
    let reporting = report.phase(Category::Reporting).unwrap();
    assert!(!reporting.ran);
    assert!(reporting.skip_reason.as_deref().unwrap().starts_with("aborted"));
    assert!(report.errors.critical);
}

#[tokio::test]
async fn phase_deadline_stops_dispatch() {
    let first = Scripted::new(TaskMetadata::new("S10_slow").sequential())
        .sleeps(Duration::from_millis(200));
    let second = Scripted::new(TaskMetadata::new("S20_next").sequential());
    let extract = Scripted::named("P01_check");
    let reg = registry(&[
        (&extract, Category::Extraction),
        (&first, Category::SecurityAnalysis),
        (&second, Category::SecurityAnalysis),
    ]);
    let errors = handler(FAST);
    let controller = PipelineController::new(
        reg.clone(),
        executor(reg, errors.clone()),
        PipelineOptions {
            phase_timeout: Some(Duration::from_millis(50)),
            ..options()
        },
    );

    let report = controller.run_phase(Category::SecurityAnalysis).await;

    assert!(report.deadline_hit);
    assert_eq!(controller.results()["S10_slow"].status, TaskStatus::Completed);
    assert_eq!(controller.results()["S20_next"].status, TaskStatus::Skipped);
    assert_eq!(second.runs(), 0);
    // A phase deadline is not a shutdown.
    assert!(!errors.shutdown().is_triggered());
}

#[tokio::test]
async fn blacklisted_tasks_are_not_planned() {
    let extract = Scripted::named("P50_extract");
    let weak = Scripted::named("P60_weak");
    let reg = registry(&[(&extract, Category::Extraction), (&weak, Category::Extraction)]);
    let controller = PipelineController::new(
        reg.clone(),
        executor(reg, handler(FAST)),
        PipelineOptions {
            blacklist: vec!["P60_weak".into()],
            ..options()
        },
    );

    let report = controller.run_phase(Category::Extraction).await;

    assert_eq!(report.tasks, vec!["P50_extract".to_string()]);
    assert_eq!(weak.runs(), 0);
}
