//! Error classification and recovery.

mod handler;
mod strategies;
mod types;

pub use handler::{ErrorHandler, ErrorHandlerBuilder, ErrorObserver, ErrorSummary, RecoveryOutcome};
pub use strategies::{FallbackStrategy, RecoveryStrategy, ResourceCleanupStrategy, RetryStrategy};
pub use types::{
    recovery_action, ErrorCategory, ErrorRecord, ErrorSeverity, Fallback, RecoveryAction,
    RecoveryContext, DEFAULT_MAX_RETRIES,
};
