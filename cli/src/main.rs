use std::path::PathBuf;

use clap::Parser;
use fwpipe_cli::commands::cli::{self, Commands};
use fwpipe_cli::{app, worker};
use fwpipe_core::api::{CliError, LoggingConfig, PipelineConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let mut cfg = fwpipe_core::api::load(args.config.as_deref())?;
    if let Some(level) = &args.log_level {
        cfg.logging.level = level.clone();
    }

    match args.command {
        Commands::Run(run_args) => {
            app::apply_run_args(&mut cfg, &run_args);
            init_tracing(&cfg.logging, Some(&cfg)).map_err(CliError::Command)?;
            app::run_pipeline(cfg, run_args.json).await
        }
        Commands::List(list_args) => {
            init_tracing(&cfg.logging, None).map_err(CliError::Command)?;
            app::list(list_args.category)
        }
        Commands::Plan(plan_args) => {
            init_tracing(&cfg.logging, None).map_err(CliError::Command)?;
            app::show_plan(&cfg, plan_args.category)
        }
        Commands::Worker(worker_args) => {
            // stdout belongs to the result line; logs go to stderr only.
            init_tracing(&cfg.logging, None).map_err(CliError::Command)?;
            worker::run(&worker_args.task)
        }
    }
}

/// Console layer on stderr, plus a file layer under the log directory when
/// `run_cfg` is given and file logging is on.
fn init_tracing(logging: &LoggingConfig, run_cfg: Option<&PipelineConfig>) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if let Some(cfg) = run_cfg.filter(|_| logging.file) {
        let dir: PathBuf = logging
            .directory
            .clone()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| cfg.log_dir.clone());

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("fwpipe.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Ok(());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
