//! `/proc`-backed metrics source.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::trace;

use crate::collector::procfs::{
    parse_global_stat, parse_meminfo, parse_net_dev, parse_uptime, sum_external_traffic,
};
use crate::collector::traits::FileSystem;
use crate::collector::{CollectError, HostSnapshot, MetricsSource};

/// Collects a `HostSnapshot` from the proc filesystem.
pub struct ProcfsSource<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
    disk_path: PathBuf,
    cpu_sample_window: Duration,
}

impl<F: FileSystem> ProcfsSource<F> {
    /// Time between the two `/proc/stat` reads used for CPU utilization.
    pub const DEFAULT_CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(200);

    /// Creates a new source.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    /// * `disk_path` - Mount path whose usage is reported
    pub fn new(fs: F, proc_path: impl Into<PathBuf>, disk_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            disk_path: disk_path.into(),
            cpu_sample_window: Self::DEFAULT_CPU_SAMPLE_WINDOW,
        }
    }

    /// Overrides the CPU sampling window. `Duration::ZERO` reads `/proc/stat`
    /// twice back to back, which reports 0% on a static mock.
    pub fn with_cpu_sample_window(mut self, window: Duration) -> Self {
        self.cpu_sample_window = window;
        self
    }

    fn read(&self, name: &str) -> Result<String, CollectError> {
        Ok(self.fs.read_to_string(&self.proc_path.join(name))?)
    }
}

impl<F: FileSystem> MetricsSource for ProcfsSource<F> {
    async fn collect(&self) -> Result<HostSnapshot, CollectError> {
        let before = parse_global_stat(&self.read("stat")?)?;
        if !self.cpu_sample_window.is_zero() {
            tokio::time::sleep(self.cpu_sample_window).await;
        }
        let after = parse_global_stat(&self.read("stat")?)?;
        let cpu_percent = after.cpu.busy_percent_since(&before.cpu);

        let mem = parse_meminfo(&self.read("meminfo")?)?;
        let disk = self.fs.disk_usage(&self.disk_path)?;
        let devices = parse_net_dev(&self.read("net/dev")?)?;
        let (net_rx_bytes, net_tx_bytes) = sum_external_traffic(&devices);
        let uptime_seconds = parse_uptime(&self.read("uptime")?)?;

        let snapshot = HostSnapshot {
            cpu_percent,
            mem_used_percent: mem.used_percent(),
            disk_used_percent: disk.used_percent(),
            net_rx_bytes,
            net_tx_bytes,
            uptime_seconds,
            boot_time: after.btime,
        };
        trace!(?snapshot, interfaces = devices.len(), "host sampled");
        Ok(snapshot)
    }
}

/// Reads the kernel hostname from `<proc_path>/sys/kernel/hostname`.
///
/// Returns `None` when the file is unreadable or blank.
pub fn read_hostname<F: FileSystem>(fs: &F, proc_path: &Path) -> Option<String> {
    let raw = fs
        .read_to_string(&proc_path.join("sys/kernel/hostname"))
        .ok()?;
    let name = raw.trim();
    (!name.is_empty()).then(|| name.to_string())
}
