use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::task::TaskMetadata;

pub const DEFAULT_PRIORITY: u32 = 100;

lazy_static! {
    static ref TRAILING_DIGITS: Regex = Regex::new(r"(\d+)$").unwrap();
    static ref MODULE_NUMBER: Regex = Regex::new(r"^[A-Za-z]+(\d+)").unwrap();
}

/// Fixed task groupings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Extraction,
    SecurityAnalysis,
    LiveEmulation,
    Reporting,
    AiAnalysis,
    DifferentialAnalysis,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Extraction,
        Category::SecurityAnalysis,
        Category::LiveEmulation,
        Category::Reporting,
        Category::AiAnalysis,
        Category::DifferentialAnalysis,
    ];

    /// Conventional single-letter name prefix of tasks in this category.
    pub fn letter(self) -> char {
        match self {
            Self::Extraction => 'P',
            Self::SecurityAnalysis => 'S',
            Self::LiveEmulation => 'L',
            Self::Reporting => 'F',
            Self::AiAnalysis => 'Q',
            Self::DifferentialAnalysis => 'D',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::SecurityAnalysis => "security-analysis",
            Self::LiveEmulation => "live-emulation",
            Self::Reporting => "reporting",
            Self::AiAnalysis => "ai-analysis",
            Self::DifferentialAnalysis => "differential-analysis",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        let found = match normalized.as_str() {
            "p" | "extraction" => Self::Extraction,
            "s" | "securityanalysis" | "security" => Self::SecurityAnalysis,
            "l" | "liveemulation" | "emulation" => Self::LiveEmulation,
            "f" | "reporting" | "report" => Self::Reporting,
            "q" | "aianalysis" | "ai" => Self::AiAnalysis,
            "d" | "differentialanalysis" | "differential" => Self::DifferentialAnalysis,
            _ => return Err(format!("unknown category: {s}")),
        };
        Ok(found)
    }
}

/// Identity and scheduling metadata of one registered task. Built once at
/// discovery time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub category: Category,
    pub priority: u32,
    /// Advisory only; the planner does not order by dependencies.
    pub dependencies: Vec<String>,
    pub parallel: bool,
    pub max_workers: usize,
    pub timeout: Option<Duration>,
    pub enabled: bool,
    pub description: String,
    pub fallback: Option<String>,
    /// Completing this task opens the extraction gate.
    pub produces_output: bool,
}

impl TaskDescriptor {
    pub fn from_metadata(meta: TaskMetadata, category: Category, about: &str) -> Self {
        let priority = meta
            .priority
            .unwrap_or_else(|| priority_from_name(&meta.name));
        let description = if meta.description.trim().is_empty() {
            first_line(about)
        } else {
            meta.description.trim().to_string()
        };

        Self {
            name: meta.name,
            category,
            priority,
            dependencies: meta.dependencies,
            parallel: meta.parallel,
            max_workers: meta.max_workers.max(1),
            timeout: meta.timeout,
            enabled: meta.enabled,
            description,
            fallback: meta.fallback,
            produces_output: meta.produces_output,
        }
    }
}

/// Priority carried by a task name: trailing digits first (`scan_50`), then
/// the module number after the letter prefix (`P50_binwalk`).
pub fn priority_from_name(name: &str) -> u32 {
    TRAILING_DIGITS
        .captures(name)
        .or_else(|| MODULE_NUMBER.captures(name))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(DEFAULT_PRIORITY)
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}
