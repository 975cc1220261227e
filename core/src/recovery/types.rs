use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::task::TaskFault;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Ordered: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Configuration,
    Dependency,
    Module,
    System,
    Network,
    Permission,
    Resource,
    Timeout,
    Validation,
    Unknown,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Dependency => "dependency",
            Self::Module => "module",
            Self::System => "system",
            Self::Network => "network",
            Self::Permission => "permission",
            Self::Resource => "resource",
            Self::Timeout => "timeout",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A re-runnable recovery step. Each call produces a fresh future.
pub type RecoveryAction = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

pub fn recovery_action<F, Fut>(f: F) -> RecoveryAction
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

#[derive(Clone)]
pub struct Fallback {
    pub task: String,
    pub action: RecoveryAction,
}

/// What a recovery strategy may use to neutralise a failure.
#[derive(Clone, Default)]
pub struct RecoveryContext {
    pub retry: Option<RecoveryAction>,
    pub fallback: Option<Fallback>,
    pub cleanup: Option<RecoveryAction>,
    pub details: Map<String, Value>,
}

impl RecoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, action: RecoveryAction) -> Self {
        self.retry = Some(action);
        self
    }

    pub fn with_fallback(mut self, task: impl Into<String>, action: RecoveryAction) -> Self {
        self.fallback = Some(Fallback {
            task: task.into(),
            action,
        });
        self
    }

    pub fn with_cleanup(mut self, action: RecoveryAction) -> Self {
        self.cleanup = Some(action);
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn fallback_task(&self) -> Option<&str> {
        self.fallback.as_ref().map(|f| f.task.as_str())
    }

    fn action_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.retry.is_some() {
            names.push("retry");
        }
        if self.fallback.is_some() {
            names.push("fallback");
        }
        if self.cleanup.is_some() {
            names.push("cleanup");
        }
        names
    }
}

impl fmt::Debug for RecoveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryContext")
            .field("actions", &self.action_names())
            .field("fallback_task", &self.fallback_task())
            .field("details", &self.details)
            .finish()
    }
}

impl Serialize for RecoveryContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RecoveryContext", 3)?;
        s.serialize_field("actions", &self.action_names())?;
        s.serialize_field("fallback_task", &self.fallback_task())?;
        s.serialize_field("details", &self.details)?;
        s.end()
    }
}

/// One classified failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub task: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub recoverable: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    pub context: RecoveryContext,
}

impl ErrorRecord {
    pub fn new(
        kind: impl Into<String>,
        message: impl Into<String>,
        severity: ErrorSeverity,
        category: ErrorCategory,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            severity,
            category,
            task: None,
            timestamp: Utc::now(),
            recoverable: true,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            context: RecoveryContext::default(),
        }
    }

    /// Classify a fault. An explicit category wins; `None` or `Unknown`
    /// lets the fault's own nature decide.
    pub fn from_fault(
        fault: &TaskFault,
        category: Option<ErrorCategory>,
        severity: ErrorSeverity,
    ) -> Self {
        let category = match category {
            Some(c) if c != ErrorCategory::Unknown => c,
            _ => fault.category(),
        };
        let mut record = Self::new(fault.kind(), fault.to_string(), severity, category);
        record.recoverable = fault.is_recoverable();
        record
    }

    pub fn task(mut self, name: impl Into<String>) -> Self {
        self.task = Some(name.into());
        self
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn context(mut self, context: RecoveryContext) -> Self {
        self.context = context;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == ErrorSeverity::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn severity_is_ordered() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Medium);
        assert!(ErrorSeverity::High < ErrorSeverity::Critical);
    }

    #[test]
    fn explicit_category_beats_inference() {
        let fault = TaskFault::Timeout(Duration::from_secs(5));
        let inferred = ErrorRecord::from_fault(&fault, None, ErrorSeverity::High);
        assert_eq!(inferred.category, ErrorCategory::Timeout);

        let explicit =
            ErrorRecord::from_fault(&fault, Some(ErrorCategory::Module), ErrorSeverity::High);
        assert_eq!(explicit.category, ErrorCategory::Module);

        let unknown =
            ErrorRecord::from_fault(&fault, Some(ErrorCategory::Unknown), ErrorSeverity::High);
        assert_eq!(unknown.category, ErrorCategory::Timeout);
    }

    #[test]
    fn abort_faults_are_flagged_unrecoverable() {
        let record = ErrorRecord::from_fault(
            &TaskFault::Interrupted("SIGTERM".into()),
            None,
            ErrorSeverity::Critical,
        );
        assert!(!record.recoverable);
        assert_eq!(record.category, ErrorCategory::System);
    }

    #[test]
    fn context_serializes_without_callables() {
        let ctx = RecoveryContext::new()
            .with_retry(recovery_action(|| async { Ok(()) }))
            .with_fallback("P55_unblob", recovery_action(|| async { Ok(()) }))
            .detail("exit_code", 3);
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["actions"], serde_json::json!(["retry", "fallback"]));
        assert_eq!(value["fallback_task"], "P55_unblob");
        assert_eq!(value["details"]["exit_code"], 3);
    }
}
