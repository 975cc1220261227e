//! Availability of the external tools behind the extractors.

use std::path::PathBuf;

use crate::tasks::EXTERNAL_TOOLS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCheck {
    pub task: &'static str,
    pub tool: &'static str,
    pub path: Option<PathBuf>,
}

impl ToolCheck {
    pub fn available(&self) -> bool {
        self.path.is_some()
    }
}

/// Look up the binary of every extractor not on the blacklist in `PATH`
/// and log the result. Missing tools are only warned about; the extractor
/// fails on its own when it runs.
pub fn check_external_tools(blacklist: &[String]) -> Vec<ToolCheck> {
    check_with(blacklist, |tool| which::which(tool).ok())
}

fn check_with(blacklist: &[String], lookup: impl Fn(&str) -> Option<PathBuf>) -> Vec<ToolCheck> {
    let wanted: Vec<(&'static str, &'static str)> = EXTERNAL_TOOLS
        .into_iter()
        .filter(|(task, _)| !blacklist.iter().any(|b| b == task))
        .collect();
    if wanted.is_empty() {
        return Vec::new();
    }

    let names: Vec<&str> = wanted.iter().map(|(_, tool)| *tool).collect();
    tracing::info!("checking external tools: {}", names.join(", "));

    wanted
        .into_iter()
        .map(|(task, tool)| {
            let path = lookup(tool);
            match &path {
                Some(p) => tracing::info!(tool, path = %p.display(), "tool available"),
                None => tracing::warn!(
                    "tool missing: {}. {} may be skipped or fail",
                    tool,
                    task
                ),
            }
            ToolCheck { task, tool, path }
        })
        .collect()
}
