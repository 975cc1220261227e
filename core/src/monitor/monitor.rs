use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{ResourceSample, ResourceSampler, SysinfoSampler};
use crate::error::MonitorError;
use crate::util::Ring;

pub const DEFAULT_SAMPLE_CAPACITY: usize = 1000;
const STOP_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceSummary {
    pub cpu_avg: f32,
    pub cpu_max: f32,
    pub memory_avg: f32,
    pub memory_max: f32,
    pub sample_count: usize,
}

struct Running {
    stop_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<()>,
    handle: JoinHandle<()>,
}

type SharedSampler = Arc<Mutex<Box<dyn ResourceSampler>>>;

/// Samples host resources on a background thread at a fixed interval into a
/// bounded ring. `start` and `stop` are idempotent.
pub struct ResourceMonitor {
    sampler: SharedSampler,
    samples: Ring<ResourceSample>,
    running: Mutex<Option<Running>>,
}

impl ResourceMonitor {
    pub fn new(sampler: Box<dyn ResourceSampler>) -> Self {
        Self::with_capacity(sampler, DEFAULT_SAMPLE_CAPACITY)
    }

    pub fn with_capacity(sampler: Box<dyn ResourceSampler>, capacity: usize) -> Self {
        Self {
            sampler: Arc::new(Mutex::new(sampler)),
            samples: Ring::new(capacity),
            running: Mutex::new(None),
        }
    }

    /// Monitor backed by `SysinfoSampler`.
    pub fn system() -> Self {
        Self::new(Box::new(SysinfoSampler::new()))
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        match self.running.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// Start sampling every `interval`. No-op when already running.
    pub fn start(&self, interval: Duration) -> Result<(), MonitorError> {
        self.start_until(interval, CancellationToken::new())
    }

    /// Like `start`, but the loop also ends once `cancel` fires. `stop` is
    /// still needed to join the thread.
    pub fn start_until(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<(), MonitorError> {
        let mut running = self.running();
        if running.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let sampler = self.sampler.clone();
        let samples = self.samples.clone();

        let handle = std::thread::Builder::new()
            .name("fwpipe-monitor".into())
            .spawn(move || {
                sample_loop(sampler, samples, stop_rx, &cancel, interval);
                let _ = done_tx.send(());
            })?;

        *running = Some(Running {
            stop_tx,
            done_rx,
            handle,
        });
        tracing::debug!("Resource monitoring started ({:?} interval)", interval);
        Ok(())
    }

    /// Signal the loop and wait (bounded) for it to exit. No-op when not
    /// running. A loop that does not exit in time is left detached.
    pub fn stop(&self) {
        let Some(run) = self.running().take() else {
            return;
        };
        let _ = run.stop_tx.send(());
        match run.done_rx.recv_timeout(STOP_WAIT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if run.handle.join().is_err() {
                    tracing::warn!("resource monitor thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("resource monitor did not stop within {:?}", STOP_WAIT);
            }
        }
        tracing::debug!("Resource monitoring stopped");
    }

    pub fn latest(&self) -> Option<ResourceSample> {
        self.samples.last()
    }

    pub fn samples(&self) -> Vec<ResourceSample> {
        self.samples.snapshot()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    pub fn summary(&self) -> ResourceSummary {
        self.samples.with(|ring| {
            if ring.is_empty() {
                return ResourceSummary::default();
            }
            let n = ring.len() as f32;
            let mut summary = ResourceSummary {
                sample_count: ring.len(),
                ..ResourceSummary::default()
            };
            for s in ring {
                summary.cpu_avg += s.cpu_percent;
                summary.memory_avg += s.memory_percent;
                summary.cpu_max = summary.cpu_max.max(s.cpu_percent);
                summary.memory_max = summary.memory_max.max(s.memory_percent);
            }
            summary.cpu_avg /= n;
            summary.memory_avg /= n;
            summary
        })
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sample_loop(
    sampler: SharedSampler,
    samples: Ring<ResourceSample>,
    stop_rx: mpsc::Receiver<()>,
    cancel: &CancellationToken,
    interval: Duration,
) {
    while !cancel.is_cancelled() {
        let sampled = match sampler.lock() {
            Ok(mut s) => s.sample(),
            Err(poisoned) => poisoned.into_inner().sample(),
        };
        match sampled {
            Ok(sample) => samples.push(sample),
            Err(e) => tracing::warn!("Resource monitoring error: {}", e),
        }

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
