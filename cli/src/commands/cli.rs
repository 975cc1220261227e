use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use fwpipe_core::api::{Category, IsolationKind, StrategyKind};

#[derive(Parser, Debug)]
#[command(name = "fwpipe", version, about = "Firmware analysis pipeline")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to ~/.fwpipe/config.toml, then ./fwpipe.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter (overrides the config and FWPIPE_LOG_LEVEL; RUST_LOG wins).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RunArgs {
    /// Firmware image or extracted directory.
    #[arg(long, short = 'f')]
    pub firmware: Option<PathBuf>,

    #[arg(long, short = 'l')]
    pub log_dir: Option<PathBuf>,

    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// sequential | bounded_pool | isolated_pool | hybrid
    #[arg(long)]
    pub strategy: Option<StrategyKind>,

    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Where isolated tasks run.
    #[arg(long, value_parser = parse_isolation)]
    pub isolation: Option<IsolationKind>,

    /// Task names never planned. Can be specified multiple times.
    #[arg(long = "blacklist", short = 'b', action = clap::ArgAction::Append)]
    pub blacklist: Vec<String>,

    #[arg(long)]
    pub emulation: bool,

    /// Re-run reporting over an earlier run's results.
    #[arg(long)]
    pub rescan: bool,

    #[arg(long)]
    pub verbose: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ListArgs {
    /// Only tasks of this category (e.g. extraction, s, reporting).
    #[arg(long, short = 'c')]
    pub category: Option<Category>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    pub category: Category,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct WorkerArgs {
    #[arg(long)]
    pub task: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline.
    Run(RunArgs),
    /// List registered tasks.
    List(ListArgs),
    /// Show how one category would be scheduled.
    Plan(PlanArgs),
    /// Run one task in this process and report back on stdout.
    #[command(hide = true)]
    Worker(WorkerArgs),
}

fn parse_isolation(s: &str) -> Result<IsolationKind, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "thread" => Ok(IsolationKind::Thread),
        "subprocess" | "process" => Ok(IsolationKind::Subprocess),
        other => Err(format!("unknown isolation backend: {other}")),
    }
}
