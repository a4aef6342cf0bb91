//! In-memory mock filesystem for exercising the metrics source without a
//! Linux `/proc`.

use crate::collector::traits::{DiskUsage, FileSystem};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
    disks: HashMap<PathBuf, DiskUsage>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file with the given content.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Registers capacity figures for a mount path.
    pub fn add_disk(&mut self, path: impl AsRef<Path>, usage: DiskUsage) {
        self.disks.insert(path.as_ref().to_path_buf(), usage);
    }

    /// A small two-interface host: 4 GiB RAM with 1 GiB available, a 100 GiB
    /// root filesystem at 25% usage, booted at `1700000000`.
    pub fn typical_host() -> Self {
        let mut fs = Self::new();
        fs.add_file(
            "/proc/stat",
            "\
cpu  4705 356 584 3699 23 0 12 0 0 0
cpu0 2352 178 292 1849 11 0 6 0 0 0
cpu1 2353 178 292 1850 12 0 6 0 0 0
intr 1462898 0 0 0
ctxt 115315
btime 1700000000
processes 8092
procs_running 2
procs_blocked 0
",
        );
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:        4194304 kB
MemFree:          524288 kB
MemAvailable:    1048576 kB
Buffers:          131072 kB
Cached:           393216 kB
SwapTotal:             0 kB
SwapFree:              0 kB
",
        );
        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  999999    1000    0    0    0     0          0         0   999999    1000    0    0    0     0       0          0
  eth0: 1000000    2000    0    0    0     0          0         0   400000    1500    0    0    0     0       0          0
  eth1:   50000     300    0    0    0     0          0         0    20000     200    0    0    0     0       0          0
",
        );
        fs.add_file("/proc/uptime", "86400.57 170000.12\n");
        fs.add_file("/proc/sys/kernel/hostname", "probe-test-01\n");

        const GIB: u64 = 1024 * 1024 * 1024;
        fs.add_disk(
            "/",
            DiskUsage {
                total: 100 * GIB,
                free: 75 * GIB,
                available: 75 * GIB,
            },
        );
        fs
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        self.disks.get(path).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no filesystem mounted at {:?}", path),
            )
        })
    }
}
