//! Parsers for the `/proc` files the probe samples.
//!
//! Pure functions over file contents so they can be tested with string inputs.

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Memory figures from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Default)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    /// `None` on kernels older than 3.14, which lack `MemAvailable`.
    pub mem_available: Option<u64>,
    pub buffers: u64,
    pub cached: u64,
}

impl MemInfo {
    /// Percentage of memory in use, treating reclaimable memory as free.
    pub fn used_percent(&self) -> f64 {
        if self.mem_total == 0 {
            return 0.0;
        }
        let available = self
            .mem_available
            .unwrap_or_else(|| {
                self.mem_free
                    .saturating_add(self.buffers)
                    .saturating_add(self.cached)
            });
        let used = self.mem_total.saturating_sub(available);
        (used as f64 / self.mem_total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut info = MemInfo::default();
    let mut saw_total = false;

    let parse_kb = |line: &str| -> u64 {
        line.split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };

    for line in content.lines() {
        if line.starts_with("MemTotal:") {
            info.mem_total = parse_kb(line);
            saw_total = true;
        } else if line.starts_with("MemFree:") {
            info.mem_free = parse_kb(line);
        } else if line.starts_with("MemAvailable:") {
            info.mem_available = Some(parse_kb(line));
        } else if line.starts_with("Buffers:") {
            info.buffers = parse_kb(line);
        } else if line.starts_with("Cached:") {
            info.cached = parse_kb(line);
        }
    }

    if !saw_total {
        return Err(ParseError::new("meminfo: missing MemTotal"));
    }
    Ok(info)
}

/// Aggregate CPU time counters (the `cpu` line of `/proc/stat`), in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        [
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
        ]
        .iter()
        .fold(self.user, |acc, v| acc.saturating_add(*v))
    }

    fn idle_total(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }

    /// Busy percentage over the window between `prev` and `self`.
    ///
    /// Returns 0 when no ticks elapsed or the counters went backwards.
    pub fn busy_percent_since(&self, prev: &CpuTimes) -> f64 {
        let total = self.total().saturating_sub(prev.total());
        if total == 0 {
            return 0.0;
        }
        let idle = self.idle_total().saturating_sub(prev.idle_total());
        let busy = total.saturating_sub(idle);
        (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Fields of `/proc/stat` the probe needs.
#[derive(Debug, Clone, Default)]
pub struct GlobalStat {
    pub cpu: CpuTimes,
    /// Boot time, seconds since the epoch. Never zero.
    pub btime: u64,
}

/// Parses `/proc/stat` content.
pub fn parse_global_stat(content: &str) -> Result<GlobalStat, ParseError> {
    let mut stat = GlobalStat::default();
    let mut saw_cpu = false;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        if parts[0] == "cpu" {
            let get_val =
                |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

            stat.cpu = CpuTimes {
                user: get_val(1),
                nice: get_val(2),
                system: get_val(3),
                idle: get_val(4),
                iowait: get_val(5),
                irq: get_val(6),
                softirq: get_val(7),
                steal: get_val(8),
            };
            saw_cpu = true;
        } else if parts[0] == "btime" {
            stat.btime = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
        }
    }

    if !saw_cpu {
        return Err(ParseError::new("stat: missing aggregate cpu line"));
    }
    // Zero is the counter store's "never observed" boot time.
    if stat.btime == 0 {
        return Err(ParseError::new("stat: missing btime"));
    }
    Ok(stat)
}

/// Per-interface byte counters from `/proc/net/dev`.
#[derive(Debug, Clone, Default)]
pub struct NetDevStats {
    pub interface: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Parses `/proc/net/dev` content.
///
/// Format:
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
pub fn parse_net_dev(content: &str) -> Result<Vec<NetDevStats>, ParseError> {
    let mut devices = Vec::new();

    for line in content.lines() {
        if line.contains('|') || line.trim().is_empty() {
            continue;
        }

        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };

        let values: Vec<&str> = counters.split_whitespace().collect();
        if values.len() < 16 {
            continue;
        }

        let get_val =
            |idx: usize| -> u64 { values.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        devices.push(NetDevStats {
            interface: name.trim().to_string(),
            rx_bytes: get_val(0),
            tx_bytes: get_val(8),
        });
    }

    Ok(devices)
}

/// Sums rx/tx bytes over every interface except loopback.
pub fn sum_external_traffic(devices: &[NetDevStats]) -> (u64, u64) {
    devices
        .iter()
        .filter(|d| d.interface != "lo")
        .fold((0u64, 0u64), |(rx, tx), d| {
            (rx.saturating_add(d.rx_bytes), tx.saturating_add(d.tx_bytes))
        })
}

/// Parses `/proc/uptime`, returning whole seconds since boot.
pub fn parse_uptime(content: &str) -> Result<u64, ParseError> {
    let first = content
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::new("uptime: empty file"))?;
    let secs: f64 = first
        .parse()
        .map_err(|_| ParseError::new(format!("uptime: invalid value '{first}'")))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(ParseError::new(format!("uptime: invalid value '{first}'")));
    }
    Ok(secs as u64)
}
