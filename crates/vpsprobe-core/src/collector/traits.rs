//! Abstractions for host filesystem access so the metrics source can run
//! against the real `/proc` on Linux or an in-memory `MockFs` in tests.

use std::io;
use std::path::Path;

/// Capacity figures for the filesystem holding a path, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub free: u64,
    /// Space available to unprivileged users (excludes root-reserved blocks).
    pub available: u64,
}

impl DiskUsage {
    /// Used space as a percentage of the space usable by unprivileged users,
    /// the same figure `df` prints.
    pub fn used_percent(&self) -> f64 {
        let used = self.total.saturating_sub(self.free);
        let usable = used.saturating_add(self.available);
        if usable == 0 {
            return 0.0;
        }
        (used as f64 / usable as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Abstraction for the host reads the metrics source performs.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Returns capacity figures for the filesystem mounted at `path`.
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage>;
}

/// Real filesystem implementation backed by `std::fs` and `statvfs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    #[cfg(unix)]
    #[allow(clippy::unnecessary_cast)]
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: `statvfs` is plain old data; an all-zero value is valid.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: `c_path` is NUL-terminated and `stat` is a valid out-pointer.
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        let fragment = stat.f_frsize as u64;
        Ok(DiskUsage {
            total: (stat.f_blocks as u64).saturating_mul(fragment),
            free: (stat.f_bfree as u64).saturating_mul(fragment),
            available: (stat.f_bavail as u64).saturating_mul(fragment),
        })
    }

    #[cfg(not(unix))]
    fn disk_usage(&self, _path: &Path) -> io::Result<DiskUsage> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "disk usage requires statvfs",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_real_fs_read_to_string() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        let content = fs.read_to_string(&cargo_toml).unwrap();
        assert!(content.contains("[package]"));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_fs_disk_usage() {
        let fs = RealFs::new();
        let usage = fs.disk_usage(&env::current_dir().unwrap()).unwrap();
        assert!(usage.total > 0);
        assert!(usage.free <= usage.total);
        let pct = usage.used_percent();
        assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn test_real_fs_disk_usage_missing_path() {
        let fs = RealFs::new();
        assert!(fs.disk_usage(Path::new("/nonexistent/path/12345")).is_err());
    }

    #[test]
    fn test_used_percent_ignores_reserved_blocks() {
        // 100 total, 20 free of which 10 are reserved for root.
        let usage = DiskUsage {
            total: 100,
            free: 20,
            available: 10,
        };
        let pct = usage.used_percent();
        assert!((pct - 80.0 / 90.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_used_percent_empty_filesystem() {
        assert_eq!(DiskUsage::default().used_percent(), 0.0);
    }
}
