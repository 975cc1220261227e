use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use super::{
    ErrorCategory, ErrorRecord, ErrorSeverity, FallbackStrategy, RecoveryContext,
    RecoveryStrategy, ResourceCleanupStrategy, RetryStrategy,
};
use crate::error::RecoveryError;
use crate::shutdown::ShutdownSignal;
use crate::task::TaskFault;

const RECENT_ERRORS: usize = 10;

/// Notified of every handled error. Observers run inline; a panicking
/// observer is logged and ignored.
pub trait ErrorObserver: Send + Sync {
    fn on_error(&self, record: &ErrorRecord);
}

impl<F> ErrorObserver for F
where
    F: Fn(&ErrorRecord) + Send + Sync,
{
    fn on_error(&self, record: &ErrorRecord) {
        self(record)
    }
}

/// Outcome of one round of strategy selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered(&'static str),
    Failed(&'static str),
    /// Nothing applicable, or the record is not recoverable.
    Unhandled,
}

impl RecoveryOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    pub total_errors: u64,
    pub by_severity: BTreeMap<ErrorSeverity, u64>,
    pub by_category: BTreeMap<ErrorCategory, u64>,
    pub recovery_attempts: u64,
    pub successful_recoveries: u64,
    pub recovery_rate: f64,
    pub critical: bool,
    pub recent: Vec<ErrorRecord>,
}

#[derive(Default)]
struct HandlerState {
    history: Vec<ErrorRecord>,
    by_severity: BTreeMap<ErrorSeverity, u64>,
    by_category: BTreeMap<ErrorCategory, u64>,
    recovery_attempts: u64,
    successful_recoveries: u64,
}

/// Classifies failures, runs recovery strategies, keeps the error history
/// and turns unrecovered critical errors into a run-wide shutdown.
pub struct ErrorHandler {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
    observers: RwLock<Vec<Arc<dyn ErrorObserver>>>,
    state: Mutex<HandlerState>,
    shutdown: ShutdownSignal,
    critical: AtomicBool,
    max_retries: u32,
}

pub struct ErrorHandlerBuilder {
    shutdown: ShutdownSignal,
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
    max_retries: u32,
}

impl ErrorHandlerBuilder {
    pub fn strategy(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Retry, fallback and resource cleanup, in that order.
    pub fn default_strategies(self, base_delay: Duration, backoff_factor: f64) -> Self {
        let retry = RetryStrategy::new(base_delay, backoff_factor)
            .cancel_on(self.shutdown.child_token());
        self.strategy(Arc::new(retry))
            .strategy(Arc::new(FallbackStrategy))
            .strategy(Arc::new(ResourceCleanupStrategy))
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn build(self) -> ErrorHandler {
        for s in &self.strategies {
            tracing::debug!("Added recovery strategy: {}", s.name());
        }
        ErrorHandler {
            strategies: self.strategies,
            observers: RwLock::new(Vec::new()),
            state: Mutex::new(HandlerState::default()),
            shutdown: self.shutdown,
            critical: AtomicBool::new(false),
            max_retries: self.max_retries,
        }
    }
}

impl ErrorHandler {
    /// Handler with the default strategy set.
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self::builder(shutdown)
            .default_strategies(Duration::from_secs(1), 2.0)
            .build()
    }

    pub fn builder(shutdown: ShutdownSignal) -> ErrorHandlerBuilder {
        ErrorHandlerBuilder {
            shutdown,
            strategies: Vec::new(),
            max_retries: super::DEFAULT_MAX_RETRIES,
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn ErrorObserver>) {
        match self.observers.write() {
            Ok(mut g) => g.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Whether an unrecovered critical error has been seen.
    pub fn is_critical(&self) -> bool {
        self.critical.load(Ordering::SeqCst)
    }

    /// Classify `fault` and handle it. Returns whether it was recovered.
    pub async fn handle_fault(
        &self,
        fault: &TaskFault,
        category: Option<ErrorCategory>,
        severity: ErrorSeverity,
        task: Option<&str>,
        context: RecoveryContext,
    ) -> bool {
        let mut record = ErrorRecord::from_fault(fault, category, severity)
            .max_retries(self.max_retries)
            .context(context);
        record.task = task.map(str::to_string);
        self.handle(&mut record).await
    }

    /// Record, notify, recover. Returns whether the error was recovered.
    pub async fn handle(&self, record: &mut ErrorRecord) -> bool {
        self.handle_outcome(record).await.is_recovered()
    }

    /// Like `handle`, but reports which strategy recovered the error.
    ///
    /// The record is added to the history once. A failed attempt is
    /// re-submitted for as long as some strategy still applies (a failed
    /// retry bumps `retry_count`, fallback and cleanup are consumed on use).
    pub async fn handle_outcome(&self, record: &mut ErrorRecord) -> RecoveryOutcome {
        log_record(record);
        self.record(record);
        self.notify(record);

        let max_rounds = record.max_retries as usize + self.strategies.len() + 1;
        let mut outcome = self.attempt_recovery(record).await;
        let mut rounds = 1;
        while matches!(outcome, RecoveryOutcome::Failed(_)) && rounds < max_rounds {
            outcome = self.attempt_recovery(record).await;
            rounds += 1;
        }

        self.finish(record, &outcome);
        outcome
    }

    /// Let the first applicable strategy try to recover `record`.
    /// Does not add to the history.
    pub async fn attempt_recovery(&self, record: &mut ErrorRecord) -> RecoveryOutcome {
        if !record.recoverable || self.shutdown.is_triggered() {
            return RecoveryOutcome::Unhandled;
        }

        let current: &ErrorRecord = record;
        let Some(strategy) = self.strategies.iter().find(|s| s.can_recover(current)) else {
            return RecoveryOutcome::Unhandled;
        };

        self.state().recovery_attempts += 1;
        match strategy.recover(record).await {
            Ok(()) => {
                self.state().successful_recoveries += 1;
                tracing::info!(
                    task = record.task.as_deref().unwrap_or("-"),
                    "Successfully recovered from error using {}",
                    strategy.name()
                );
                RecoveryOutcome::Recovered(strategy.name())
            }
            Err(RecoveryError::Cancelled) => RecoveryOutcome::Unhandled,
            Err(e) => {
                tracing::warn!(
                    task = record.task.as_deref().unwrap_or("-"),
                    "Recovery strategy {} failed: {}",
                    strategy.name(),
                    e
                );
                RecoveryOutcome::Failed(strategy.name())
            }
        }
    }

    /// Escalate a critical, unrecoverable condition (signals, fatal
    /// resource exhaustion). Always ends in a shutdown.
    pub async fn handle_critical(
        &self,
        message: impl Into<String>,
        category: ErrorCategory,
        details: Map<String, Value>,
    ) {
        let context = RecoveryContext {
            details,
            ..RecoveryContext::default()
        };
        let mut record = ErrorRecord::new(
            "CriticalError",
            message,
            ErrorSeverity::Critical,
            category,
        )
        .recoverable(false)
        .context(context);
        self.handle(&mut record).await;
    }

    fn finish(&self, record: &ErrorRecord, outcome: &RecoveryOutcome) {
        if record.is_critical() && !outcome.is_recovered() {
            self.critical.store(true, Ordering::SeqCst);
            if self.shutdown.trigger(record.message.clone()) {
                tracing::error!(
                    "Critical error could not be recovered, initiating shutdown: {}",
                    record.message
                );
            }
        }
    }

    pub fn summary(&self) -> ErrorSummary {
        let state = self.state();
        let total_errors = state.history.len() as u64;
        let recovery_rate = if state.recovery_attempts > 0 {
            state.successful_recoveries as f64 / state.recovery_attempts as f64
        } else {
            0.0
        };
        let recent = state
            .history
            .iter()
            .skip(state.history.len().saturating_sub(RECENT_ERRORS))
            .cloned()
            .collect();

        ErrorSummary {
            total_errors,
            by_severity: state.by_severity.clone(),
            by_category: state.by_category.clone(),
            recovery_attempts: state.recovery_attempts,
            successful_recoveries: state.successful_recoveries,
            recovery_rate,
            critical: self.is_critical(),
            recent,
        }
    }

    pub fn history(&self) -> Vec<ErrorRecord> {
        self.state().history.clone()
    }

    pub fn clear_history(&self) {
        self.state().history.clear();
        tracing::debug!("Error history cleared");
    }

    fn record(&self, record: &ErrorRecord) {
        let mut state = self.state();
        state.history.push(record.clone());
        *state.by_severity.entry(record.severity).or_default() += 1;
        *state.by_category.entry(record.category).or_default() += 1;
    }

    fn notify(&self, record: &ErrorRecord) {
        let observers = match self.observers.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer.on_error(record))).is_err() {
                tracing::warn!("Error observer panicked while handling {}", record.kind);
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, HandlerState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn log_record(record: &ErrorRecord) {
    let task = record.task.as_deref().unwrap_or("-");
    match record.severity {
        ErrorSeverity::Critical => {
            tracing::error!(task, category = %record.category, "CRITICAL ERROR: {}", record.message)
        }
        ErrorSeverity::High => {
            tracing::error!(task, category = %record.category, "HIGH ERROR: {}", record.message)
        }
        ErrorSeverity::Medium => {
            tracing::warn!(task, category = %record.category, "MEDIUM ERROR: {}", record.message)
        }
        ErrorSeverity::Low => {
            tracing::info!(task, category = %record.category, "LOW ERROR: {}", record.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::recovery_action;
    use std::sync::atomic::AtomicUsize;

    fn quick_handler(shutdown: ShutdownSignal) -> ErrorHandler {
        ErrorHandler::builder(shutdown)
            .default_strategies(Duration::from_millis(1), 1.0)
            .build()
    }

    #[tokio::test]
    async fn critical_without_strategies_shuts_down() {
        let shutdown = ShutdownSignal::new();
        let handler = ErrorHandler::builder(shutdown.clone()).build();

        let mut record = ErrorRecord::new(
            "OutOfMemory",
            "allocation failed",
            ErrorSeverity::Critical,
            ErrorCategory::Resource,
        )
        .recoverable(false);
        assert!(!handler.handle(&mut record).await);

        assert!(shutdown.is_triggered());
        assert!(handler.is_critical());
        assert_eq!(shutdown.reason().as_deref(), Some("allocation failed"));
    }

    #[tokio::test]
    async fn ordinary_failures_do_not_shut_down() {
        let shutdown = ShutdownSignal::new();
        let handler = quick_handler(shutdown.clone());

        let recovered = handler
            .handle_fault(
                &TaskFault::Other("exit 3".into()),
                Some(ErrorCategory::Module),
                ErrorSeverity::Medium,
                Some("S10_scan"),
                RecoveryContext::new(),
            )
            .await;
        assert!(!recovered);
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn summary_counts_and_rates() {
        let handler = quick_handler(ShutdownSignal::new());
        let ok = RecoveryContext::new().with_retry(recovery_action(|| async { Ok(()) }));
        let bad =
            RecoveryContext::new().with_retry(recovery_action(|| async { Err("no".to_string()) }));

        for ctx in [ok, bad] {
            let mut record =
                ErrorRecord::new("Exit", "exit 4", ErrorSeverity::Low, ErrorCategory::Module)
                    .context(ctx);
            handler.handle(&mut record).await;
        }
        handler
            .handle_critical("SIGINT", ErrorCategory::System, Map::new())
            .await;

        let summary = handler.summary();
        // The failing retry is re-submitted until max_retries is used up.
        assert_eq!(summary.total_errors, 3);
        assert_eq!(summary.recovery_attempts, 4);
        assert_eq!(summary.successful_recoveries, 1);
        assert!((summary.recovery_rate - 0.25).abs() < f64::EPSILON);
        assert_eq!(summary.by_category.get(&ErrorCategory::Module), Some(&2));
        assert_eq!(summary.by_severity.get(&ErrorSeverity::Critical), Some(&1));
        assert!(summary.critical);
    }

    #[tokio::test]
    async fn recent_keeps_last_ten() {
        let handler = ErrorHandler::builder(ShutdownSignal::new()).build();
        for i in 0..15 {
            let mut record = ErrorRecord::new(
                "Exit",
                format!("failure {i}"),
                ErrorSeverity::Low,
                ErrorCategory::Module,
            );
            handler.handle(&mut record).await;
        }
        let summary = handler.summary();
        assert_eq!(summary.recent.len(), 10);
        assert_eq!(summary.recent[0].message, "failure 5");
        assert_eq!(handler.history().len(), 15);

        handler.clear_history();
        assert!(handler.history().is_empty());
    }

    #[tokio::test]
    async fn panicking_observer_does_not_interrupt_handling() {
        let handler = ErrorHandler::builder(ShutdownSignal::new()).build();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        handler.add_observer(Arc::new(|_: &ErrorRecord| panic!("observer bug")));
        handler.add_observer(Arc::new(move |_: &ErrorRecord| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut record =
            ErrorRecord::new("Exit", "exit 5", ErrorSeverity::Low, ErrorCategory::Module);
        handler.handle(&mut record).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(handler.summary().total_errors, 1);
    }
}
