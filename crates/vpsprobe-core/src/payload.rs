//! JSON body of a report.

use std::time::Duration;

use serde::Serialize;

use crate::VERSION;
use crate::collector::HostSnapshot;
use crate::state::Reconciliation;

/// One cycle's report, serialized with camelCase keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub snapshot: HostSnapshot,
    pub bandwidth: Bandwidth,
    pub meta: Meta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bandwidth {
    pub delta_rx_bytes: u64,
    pub delta_tx_bytes: u64,
    pub total_rx_bytes: u64,
    pub total_tx_bytes: u64,
    /// Bytes per second over the reporting interval.
    pub rx_speed: u64,
    pub tx_speed: u64,
}

impl Bandwidth {
    pub fn new(reconciled: &Reconciliation, interval: Duration) -> Self {
        Self {
            delta_rx_bytes: reconciled.delta_rx,
            delta_tx_bytes: reconciled.delta_tx,
            total_rx_bytes: reconciled.total_rx,
            total_tx_bytes: reconciled.total_tx,
            rx_speed: per_second(reconciled.delta_rx, interval),
            tx_speed: per_second(reconciled.delta_tx, interval),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub version: String,
    pub os: String,
    pub arch: String,
    /// Reporting interval in whole seconds.
    pub interval: u64,
}

impl Meta {
    /// Metadata describing this build and host platform.
    pub fn current(interval: Duration) -> Self {
        Self {
            version: VERSION.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            interval: interval.as_secs(),
        }
    }
}

/// Integer bytes-per-second over whole seconds of `interval`; zero when the
/// interval is shorter than one second.
pub fn per_second(delta: u64, interval: Duration) -> u64 {
    match interval.as_secs() {
        0 => 0,
        secs => delta / secs,
    }
}
