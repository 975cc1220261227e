use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fwpipe_core::error::MonitorError;
use fwpipe_core::monitor::{ResourceMonitor, ResourceSample, ResourceSampler};

/// Counts how often it was asked for a sample.
struct Counting(Arc<AtomicU32>);

impl ResourceSampler for Counting {
    fn sample(&mut self) -> Result<ResourceSample, MonitorError> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        Ok(ResourceSample {
            timestamp: Utc::now(),
            cpu_percent: (n % 100) as f32,
            memory_percent: 40.0,
            memory_available_bytes: 1 << 30,
            disk_percent: 10.0,
            disk_free_bytes: 1 << 32,
        })
    }
}

fn counting() -> (ResourceMonitor, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    (ResourceMonitor::new(Box::new(Counting(calls.clone()))), calls)
}

#[test]
fn samples_at_the_requested_interval() {
    let (monitor, _) = counting();
    monitor.start(Duration::from_millis(100)).unwrap();
    std::thread::sleep(Duration::from_millis(500));
    monitor.stop();

    let count = monitor.sample_count();
    assert!((3..=7).contains(&count), "got {count} samples");
    assert!(!monitor.is_running());
}

#[test]
fn ring_never_exceeds_capacity() {
    let calls = Arc::new(AtomicU32::new(0));
    let monitor = ResourceMonitor::with_capacity(Box::new(Counting(calls.clone())), 16);
    monitor.start(Duration::from_millis(1)).unwrap();
    while calls.load(Ordering::SeqCst) < 64 {
        std::thread::sleep(Duration::from_millis(2));
    }
    monitor.stop();

    assert_eq!(monitor.sample_count(), 16);
    // Oldest samples went first.
    let samples = monitor.samples();
    let total = calls.load(Ordering::SeqCst);
    assert_eq!(samples.last().unwrap().cpu_percent, ((total - 1) % 100) as f32);
}

#[test]
fn default_capacity_is_one_thousand() {
    let (monitor, _) = counting();
    assert_eq!(monitor.capacity(), 1000);
}

#[test]
fn stop_is_idempotent() {
    let (monitor, calls) = counting();
    monitor.stop();
    assert_eq!(monitor.sample_count(), 0);

    monitor.start(Duration::from_millis(10)).unwrap();
    std::thread::sleep(Duration::from_millis(35));
    monitor.stop();
    let after_first = monitor.samples();
    monitor.stop();

    assert_eq!(monitor.samples().len(), after_first.len());
    assert_eq!(calls.load(Ordering::SeqCst) as usize, after_first.len());
}

#[test]
fn summary_reports_averages_and_maxima() {
    let (monitor, _) = counting();
    monitor.start(Duration::from_millis(5)).unwrap();
    while monitor.sample_count() < 4 {
        std::thread::sleep(Duration::from_millis(5));
    }
    monitor.stop();

    let summary = monitor.summary();
    let samples = monitor.samples();
    let mean = samples.iter().map(|s| s.cpu_percent).sum::<f32>() / samples.len() as f32;
    assert_eq!(summary.sample_count, samples.len());
    assert!((summary.cpu_avg - mean).abs() < 1e-3);
    assert_eq!(summary.memory_max, 40.0);
    assert!(summary.cpu_max >= summary.cpu_avg);
}

#[test]
fn restart_after_stop() {
    let (monitor, _) = counting();
    monitor.start(Duration::from_millis(5)).unwrap();
    monitor.stop();
    let first = monitor.sample_count();

    monitor.start(Duration::from_millis(5)).unwrap();
    assert!(monitor.is_running());
    std::thread::sleep(Duration::from_millis(30));
    monitor.stop();
    assert!(monitor.sample_count() > first);
}
