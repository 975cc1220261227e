//! Process-wide shutdown signal.
//!
//! One `ShutdownSignal` is created per run and cloned into every long-running
//! component (executors, the monitor loop, the signal listener). Triggering it
//! never kills anything; executors observe it between dispatches and leave
//! in-flight tasks to finish or hit their own timeout.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

#[derive(Clone, Default, Debug)]
pub struct ShutdownSignal {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only for the call that actually flipped the signal.
    pub fn trigger(&self, reason: impl Into<String>) -> bool {
        let mut slot = match self.reason.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason.into());
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<String> {
        match self.reason.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Token cancelled together with this signal. Cancelling a child does
    /// not propagate upward, which is what phase deadlines rely on.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
