//! In-process and thread-isolated attempt runners.
//!
//! Both abandon the worker on timeout; neither can kill it. The subprocess
//! backend lives in the plugins crate.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinError;

use super::traits::{Attempt, AttemptOutcome, AttemptRequest, IsolationBackend};
use crate::task::{TaskContext, TaskFault, TaskLogger, TaskPlugin};

/// Create, validate, run and clean up one task instance on the current
/// thread. Panics anywhere in the lifecycle become `TaskFault::Panicked`.
pub fn run_attempt(plugin: &dyn TaskPlugin, ctx: &TaskContext, logger: TaskLogger) -> AttemptOutcome {
    let lifecycle = catch_unwind(AssertUnwindSafe(|| {
        let task_name = logger.task().to_string();
        let mut task = plugin.create(ctx, logger);
        if !task.pre_run() {
            return AttemptOutcome::Declined;
        }

        let run = catch_unwind(AssertUnwindSafe(|| task.run()));
        if catch_unwind(AssertUnwindSafe(|| task.post_run())).is_err() {
            tracing::warn!(task = %task_name, "post_run panicked");
        }

        match run {
            Ok(Ok(code)) => AttemptOutcome::Exited(code),
            Ok(Err(fault)) => AttemptOutcome::Faulted(fault),
            Err(payload) => AttemptOutcome::Faulted(TaskFault::from_panic(payload)),
        }
    }));

    lifecycle.unwrap_or_else(|payload| AttemptOutcome::Faulted(TaskFault::from_panic(payload)))
}

fn joined(result: Result<AttemptOutcome, JoinError>) -> AttemptOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => AttemptOutcome::Faulted(TaskFault::from_panic(e.into_panic())),
        Err(e) => AttemptOutcome::Faulted(TaskFault::Other(format!("worker join failed: {e}"))),
    }
}

/// Runs attempts on tokio's blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcess;

#[async_trait]
impl IsolationBackend for InProcess {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn run(&self, request: AttemptRequest) -> Attempt {
        let AttemptRequest {
            plugin,
            context,
            logger,
            timeout,
            ..
        } = request;
        let capture = logger.clone();
        let handle =
            tokio::task::spawn_blocking(move || run_attempt(plugin.as_ref(), &context, logger));

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(result) => joined(result),
                Err(_) => AttemptOutcome::Faulted(TaskFault::Timeout(limit)),
            },
            None => joined(handle.await),
        };
        Attempt::captured(outcome, &capture)
    }
}

/// Runs every attempt on its own named OS thread behind an unwind
/// boundary. The orchestrator only ever sees the message sent back.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadIsolation;

impl ThreadIsolation {
    async fn wait(rx: oneshot::Receiver<AttemptOutcome>, timeout: Option<Duration>) -> AttemptOutcome {
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => return AttemptOutcome::Faulted(TaskFault::Timeout(limit)),
            },
            None => rx.await,
        };
        received.unwrap_or_else(|_| {
            AttemptOutcome::Faulted(TaskFault::Panicked(
                "isolated worker exited without a result".to_string(),
            ))
        })
    }
}

#[async_trait]
impl IsolationBackend for ThreadIsolation {
    fn name(&self) -> &'static str {
        "thread"
    }

    async fn run(&self, request: AttemptRequest) -> Attempt {
        let AttemptRequest {
            plugin,
            descriptor,
            context,
            logger,
            timeout,
        } = request;
        let capture = logger.clone();
        let (tx, rx) = oneshot::channel();

        let spawned = std::thread::Builder::new()
            .name(format!("fwpipe-{}", descriptor.name.to_ascii_lowercase()))
            .spawn(move || {
                let outcome = run_attempt(plugin.as_ref(), &context, logger);
                let _ = tx.send(outcome);
            });

        let outcome = match spawned {
            Ok(_detached) => Self::wait(rx, timeout).await,
            Err(e) => AttemptOutcome::Faulted(TaskFault::ResourceExhausted(format!(
                "cannot spawn worker thread: {e}"
            ))),
        };
        Attempt::captured(outcome, &capture)
    }
}
