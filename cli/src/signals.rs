//! SIGINT/SIGTERM interception. A signal is a critical error: it goes
//! through the error handler, which triggers the run's shutdown.

use std::sync::Arc;

use fwpipe_core::api::{ErrorCategory, ErrorHandler};
use serde_json::{json, Map};
use tokio::task::JoinHandle;

pub fn spawn_signal_listener(errors: Arc<ErrorHandler>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = wait_for_signal().await;
        tracing::warn!("received {}, shutting down", name);

        let mut details = Map::new();
        details.insert("signal".to_string(), json!(name));
        errors
            .handle_critical(format!("received {name}"), ErrorCategory::System, details)
            .await;
    })
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            _ = ctrl_c() => "SIGINT",
            _ = term.recv() => "SIGTERM",
        },
        Err(e) => {
            tracing::warn!("cannot listen for SIGTERM: {}", e);
            ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await;
    "SIGINT"
}
