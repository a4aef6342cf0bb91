//! Host metrics sampling.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                ProcfsSource                  │
//! │  /proc/stat      cpu busy %, btime           │
//! │  /proc/meminfo   memory used %               │
//! │  /proc/net/dev   rx/tx bytes (no loopback)   │
//! │  /proc/uptime    uptime                      │
//! │  statvfs(path)   disk used %                 │
//! └─────────────────────┬────────────────────────┘
//!                ┌──────▼──────┐
//!                │  FileSystem │ (trait)
//!                └──────┬──────┘
//!          ┌────────────┴────────────┐
//!   ┌──────▼──────┐           ┌──────▼──────┐
//!   │   RealFs    │           │   MockFs    │
//!   └─────────────┘           └─────────────┘
//! ```
//!
//! ```
//! use vpsprobe_core::collector::{MetricsSource, MockFs, ProcfsSource};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let source = ProcfsSource::new(MockFs::typical_host(), "/proc", "/")
//!     .with_cpu_sample_window(Duration::ZERO);
//! let snapshot = source.collect().await.unwrap();
//! assert_eq!(snapshot.boot_time, 1_700_000_000);
//! # });
//! ```

mod host;
pub mod mock;
pub mod procfs;
pub mod traits;

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use host::{ProcfsSource, read_hostname};
pub use mock::MockFs;
pub use procfs::ParseError;
pub use traits::{DiskUsage, FileSystem, RealFs};

/// One point-in-time reading of the host.
///
/// Serialized verbatim as the `snapshot` object of the report body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSnapshot {
    pub cpu_percent: f64,
    pub mem_used_percent: f64,
    pub disk_used_percent: f64,
    /// Raw cumulative received bytes across external interfaces.
    pub net_rx_bytes: u64,
    /// Raw cumulative transmitted bytes across external interfaces.
    pub net_tx_bytes: u64,
    pub uptime_seconds: u64,
    /// Host boot time in seconds since the epoch; changes on every reboot.
    pub boot_time: u64,
}

/// Error type for collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// I/O error reading a host file or querying the filesystem.
    Io(std::io::Error),
    /// Unexpected content in a host file.
    Parse(String),
    /// Collection did not finish within its time budget.
    Timeout(Duration),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
            CollectError::Timeout(after) => {
                write!(f, "collection timed out after {}ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}

/// Anything that can produce a `HostSnapshot`.
///
/// Implementations keep no memory between calls.
pub trait MetricsSource: Send + Sync {
    fn collect(&self) -> impl Future<Output = Result<HostSnapshot, CollectError>> + Send;
}
