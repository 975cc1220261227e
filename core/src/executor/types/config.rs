use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Concurrency mechanism used to run a set of tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Sequential,
    #[default]
    #[serde(alias = "pool", alias = "thread")]
    BoundedPool,
    #[serde(alias = "isolated", alias = "process")]
    IsolatedPool,
    Hybrid,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::BoundedPool => "bounded_pool",
            Self::IsolatedPool => "isolated_pool",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sequential" | "seq" => Ok(Self::Sequential),
            "bounded_pool" | "pool" | "thread" | "threads" => Ok(Self::BoundedPool),
            "isolated_pool" | "isolated" | "process" | "processes" => Ok(Self::IsolatedPool),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown execution strategy: {other}")),
        }
    }
}

/// Per-dispatch knobs handed to a strategy.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub max_workers: usize,
    /// Applies to tasks without their own declared timeout.
    pub timeout: Option<Duration>,
    /// Once cancelled, no further task is dispatched.
    pub stop: CancellationToken,
}

impl DispatchOptions {
    pub fn new(max_workers: usize, stop: CancellationToken) -> Self {
        Self {
            max_workers: max_workers.max(1),
            timeout: None,
            stop,
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_parse() {
        assert_eq!("hybrid".parse::<StrategyKind>(), Ok(StrategyKind::Hybrid));
        assert_eq!("pool".parse::<StrategyKind>(), Ok(StrategyKind::BoundedPool));
        assert_eq!(
            "isolated-pool".parse::<StrategyKind>(),
            Ok(StrategyKind::IsolatedPool)
        );
        assert!("remote".parse::<StrategyKind>().is_err());
        for kind in [
            StrategyKind::Sequential,
            StrategyKind::BoundedPool,
            StrategyKind::IsolatedPool,
            StrategyKind::Hybrid,
        ] {
            assert_eq!(kind.as_str().parse::<StrategyKind>(), Ok(kind));
        }
    }
}
