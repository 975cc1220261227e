use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ErrorCategory, ErrorRecord, ErrorSeverity};
use crate::error::RecoveryError;

/// A pluggable policy that tries to neutralise a classified error.
///
/// The handler asks strategies in registration order and lets the first one
/// whose `can_recover` holds make the attempt.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_recover(&self, record: &ErrorRecord) -> bool;

    async fn recover(&self, record: &mut ErrorRecord) -> Result<(), RecoveryError>;
}

/// Re-invokes the failed operation after an exponential backoff delay.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    base_delay: Duration,
    backoff_factor: f64,
    cancel: Option<CancellationToken>,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2.0)
    }
}

impl RetryStrategy {
    pub fn new(base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            base_delay,
            backoff_factor: backoff_factor.max(1.0),
            cancel: None,
        }
    }

    /// Abort pending backoff sleeps when `token` is cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// `base_delay * backoff_factor ^ retry_count`
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = self.backoff_factor.powi(retry_count as i32);
        self.base_delay.mul_f64(factor)
    }
}

#[async_trait]
impl RecoveryStrategy for RetryStrategy {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn can_recover(&self, record: &ErrorRecord) -> bool {
        record.recoverable
            && record.retry_count < record.max_retries
            && matches!(record.severity, ErrorSeverity::Low | ErrorSeverity::Medium)
            && record.context.retry.is_some()
    }

    async fn recover(&self, record: &mut ErrorRecord) -> Result<(), RecoveryError> {
        let action = record
            .context
            .retry
            .clone()
            .ok_or(RecoveryError::NoAction("retry"))?;

        record.retry_count += 1;
        let delay = self.delay_for(record.retry_count);
        tracing::debug!(
            task = record.task.as_deref().unwrap_or("-"),
            attempt = record.retry_count,
            "retrying in {:?}",
            delay
        );

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(RecoveryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }

        action().await.map_err(|reason| RecoveryError::Failed {
            strategy: "retry",
            reason,
        })
    }
}

/// Runs a designated substitute once for a failed module.
#[derive(Debug, Clone, Default)]
pub struct FallbackStrategy;

#[async_trait]
impl RecoveryStrategy for FallbackStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn can_recover(&self, record: &ErrorRecord) -> bool {
        record.category == ErrorCategory::Module
            && record.task.is_some()
            && record.context.fallback.is_some()
    }

    async fn recover(&self, record: &mut ErrorRecord) -> Result<(), RecoveryError> {
        let fallback = record
            .context
            .fallback
            .take()
            .ok_or(RecoveryError::NoAction("fallback"))?;
        tracing::info!(
            task = record.task.as_deref().unwrap_or("-"),
            "running fallback {}",
            fallback.task
        );
        (fallback.action)().await.map_err(|reason| RecoveryError::Failed {
            strategy: "fallback",
            reason,
        })
    }
}

/// Releases resources so the caller can try the operation again.
#[derive(Debug, Clone, Default)]
pub struct ResourceCleanupStrategy;

#[async_trait]
impl RecoveryStrategy for ResourceCleanupStrategy {
    fn name(&self) -> &'static str {
        "resource-cleanup"
    }

    fn can_recover(&self, record: &ErrorRecord) -> bool {
        record.category == ErrorCategory::Resource && record.context.cleanup.is_some()
    }

    async fn recover(&self, record: &mut ErrorRecord) -> Result<(), RecoveryError> {
        let cleanup = record
            .context
            .cleanup
            .take()
            .ok_or(RecoveryError::NoAction("cleanup"))?;
        cleanup().await.map_err(|reason| RecoveryError::Failed {
            strategy: "resource-cleanup",
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{recovery_action, RecoveryContext};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn record(severity: ErrorSeverity, category: ErrorCategory) -> ErrorRecord {
        ErrorRecord::new("Exit", "exit code 3", severity, category).task("P50_x")
    }

    #[test]
    fn backoff_grows_exponentially() {
        let retry = RetryStrategy::new(Duration::from_millis(100), 2.0);
        assert_eq!(retry.delay_for(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn retry_only_for_low_and_medium() {
        let retry = RetryStrategy::default();
        let ctx = RecoveryContext::new().with_retry(recovery_action(|| async { Ok(()) }));

        let medium = record(ErrorSeverity::Medium, ErrorCategory::Module).context(ctx.clone());
        assert!(retry.can_recover(&medium));

        let high = record(ErrorSeverity::High, ErrorCategory::Module).context(ctx.clone());
        assert!(!retry.can_recover(&high));

        let mut exhausted = record(ErrorSeverity::Low, ErrorCategory::Module).context(ctx);
        exhausted.retry_count = exhausted.max_retries;
        assert!(!retry.can_recover(&exhausted));

        let no_action = record(ErrorSeverity::Low, ErrorCategory::Module);
        assert!(!retry.can_recover(&no_action));
    }

    #[tokio::test]
    async fn failed_retry_counts_the_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let ctx = RecoveryContext::new().with_retry(recovery_action(move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err("still failing".to_string())
            }
        }));
        let mut rec = record(ErrorSeverity::Medium, ErrorCategory::Module).context(ctx);
        let retry = RetryStrategy::new(Duration::from_millis(1), 1.0);

        let err = retry.recover(&mut rec).await.unwrap_err();
        assert!(matches!(err, RecoveryError::Failed { strategy: "retry", .. }));
        assert_eq!(rec.retry_count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_backoff_does_not_invoke() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = RecoveryContext::new().with_retry(recovery_action(|| async { Ok(()) }));
        let mut rec = record(ErrorSeverity::Low, ErrorCategory::Module).context(ctx);
        let retry = RetryStrategy::new(Duration::from_secs(60), 2.0).cancel_on(token);

        assert_eq!(retry.recover(&mut rec).await, Err(RecoveryError::Cancelled));
    }

    #[tokio::test]
    async fn fallback_runs_once() {
        let ctx = RecoveryContext::new()
            .with_fallback("P55_unblob", recovery_action(|| async { Ok(()) }));
        let mut rec = record(ErrorSeverity::Medium, ErrorCategory::Module).context(ctx);
        let fallback = FallbackStrategy;

        assert!(fallback.can_recover(&rec));
        assert!(fallback.recover(&mut rec).await.is_ok());
        assert!(!fallback.can_recover(&rec));
    }

    #[tokio::test]
    async fn cleanup_needs_resource_category() {
        let ctx = RecoveryContext::new().with_cleanup(recovery_action(|| async { Ok(()) }));
        let cleanup = ResourceCleanupStrategy;

        let module = record(ErrorSeverity::Medium, ErrorCategory::Module).context(ctx.clone());
        assert!(!cleanup.can_recover(&module));

        let mut resource = record(ErrorSeverity::Medium, ErrorCategory::Resource).context(ctx);
        assert!(cleanup.can_recover(&resource));
        assert!(cleanup.recover(&mut resource).await.is_ok());
    }
}
