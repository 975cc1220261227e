use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_available_bytes: u64,
    pub disk_percent: f32,
    pub disk_free_bytes: u64,
}

pub trait ResourceSampler: Send {
    fn sample(&mut self) -> Result<ResourceSample, MonitorError>;
}

/// Host-wide CPU, memory and disk usage via `sysinfo`.
pub struct SysinfoSampler {
    sys: sysinfo::System,
    disks: sysinfo::Disks,
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut sys = sysinfo::System::new();
        // CPU usage is a delta; prime it so the first sample is meaningful.
        sys.refresh_cpu();
        sys.refresh_memory();
        Self {
            sys,
            disks: sysinfo::Disks::new_with_refreshed_list(),
        }
    }

    /// `(used %, free bytes)` of the root mount, or of the largest disk when
    /// nothing is mounted at `/`.
    fn disk_usage(&self) -> Option<(f32, u64)> {
        let disks = self.disks.list();
        let disk = disks
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| disks.iter().max_by_key(|d| d.total_space()))?;
        let total = disk.total_space();
        if total == 0 {
            return None;
        }
        let free = disk.available_space();
        let used = total.saturating_sub(free);
        Some(((used as f64 / total as f64 * 100.0) as f32, free))
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample(&mut self) -> Result<ResourceSample, MonitorError> {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();
        self.disks.refresh();

        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return Err(MonitorError::Sample("no CPU information available".into()));
        }
        let cpu_percent = cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32;

        let total_memory = self.sys.total_memory().max(1);
        let memory_percent = (self.sys.used_memory() as f64 / total_memory as f64 * 100.0) as f32;
        let (disk_percent, disk_free_bytes) = self.disk_usage().unwrap_or((0.0, 0));

        Ok(ResourceSample {
            timestamp: Utc::now(),
            cpu_percent,
            memory_percent,
            memory_available_bytes: self.sys.available_memory(),
            disk_percent,
            disk_free_bytes,
        })
    }
}
