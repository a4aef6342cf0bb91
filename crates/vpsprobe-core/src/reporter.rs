//! One reporting cycle.
//!
//! ```text
//! Idle → Collecting → Reconciling → Sending ─┬→ Committing  → Idle
//!                                             └→ RollingBack → Idle
//! ```
//!
//! The counter store is mutated in memory during reconciliation, before the
//! send. A failed send restores the undo point taken just before, so the
//! same bytes are offered again as a delta next cycle. A successful send is
//! persisted; if that save fails the in-memory advance is kept, because the
//! collector has already accepted the new totals.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::collector::{CollectError, MetricsSource};
use crate::config::Config;
use crate::payload::{Bandwidth, Meta, ReportPayload};
use crate::signer;
use crate::state::{CounterStore, ResetReason};
use crate::transport::{SignedReport, Transport, TransportError};

/// Error type for a failed cycle.
#[derive(Debug)]
pub enum ReportError {
    /// No snapshot; the counter store was not touched.
    Collect(CollectError),
    /// The payload could not be serialized; reconciliation was rolled back.
    Encode(serde_json::Error),
    /// Delivery failed; reconciliation was rolled back.
    Transport(TransportError),
}

impl ReportError {
    /// Whether the cycle had reconciled and then restored the undo point.
    pub fn rolled_back(&self) -> bool {
        !matches!(self, ReportError::Collect(_))
    }
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Collect(e) => write!(f, "collect metrics: {}", e),
            ReportError::Encode(e) => write!(f, "encode payload: {}", e),
            ReportError::Transport(e) => write!(f, "send report: {}", e),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Collect(e) => Some(e),
            ReportError::Encode(e) => Some(e),
            ReportError::Transport(e) => Some(e),
        }
    }
}

impl From<CollectError> for ReportError {
    fn from(e: CollectError) -> Self {
        ReportError::Collect(e)
    }
}

impl From<TransportError> for ReportError {
    fn from(e: TransportError) -> Self {
        ReportError::Transport(e)
    }
}

/// Outcome of a delivered cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub bandwidth: Bandwidth,
    pub reset: Option<ResetReason>,
    /// HTTP status the collector answered with.
    pub status: u16,
    /// False when the state file could not be written after the send.
    pub persisted: bool,
}

/// Drives collect → reconcile → sign → send → commit/rollback.
pub struct Reporter<S, T> {
    source: S,
    transport: T,
    store: CounterStore,
    secret: Vec<u8>,
    node_id: String,
    hostname: Option<String>,
    interval: Duration,
    state_path: PathBuf,
    collect_timeout: Duration,
    send_timeout: Duration,
}

impl<S: MetricsSource, T: Transport> Reporter<S, T> {
    pub fn new(config: &Config, source: S, transport: T, store: CounterStore) -> Self {
        Self {
            source,
            transport,
            store,
            secret: config.secret.clone(),
            node_id: config.node_id.clone(),
            hostname: config.hostname.clone(),
            interval: config.interval,
            state_path: config.state_path.clone(),
            collect_timeout: config.collect_timeout,
            send_timeout: config.send_timeout,
        }
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one cycle. `cancel` aborts an in-flight send, which then counts
    /// as a failed send.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, ReportError> {
        let started = Instant::now();

        trace!(phase = "collecting");
        let snapshot = tokio::time::timeout(self.collect_timeout, self.source.collect())
            .await
            .map_err(|_| CollectError::Timeout(self.collect_timeout))??;

        trace!(phase = "reconciling");
        let undo = self.store.snapshot();
        let reconciled = self.store.reconcile(
            snapshot.boot_time,
            snapshot.net_rx_bytes,
            snapshot.net_tx_bytes,
        );
        if let Some(reason) = reconciled.reset {
            info!(
                %reason,
                boot_time = snapshot.boot_time,
                rx_bytes = snapshot.net_rx_bytes,
                tx_bytes = snapshot.net_tx_bytes,
                "counter baseline reset"
            );
        }

        let bandwidth = Bandwidth::new(&reconciled, self.interval);
        let payload = ReportPayload {
            node_id: self.node_id.clone(),
            hostname: self.hostname.clone(),
            snapshot,
            bandwidth,
            meta: Meta::current(self.interval),
        };
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                self.store.restore(undo);
                return Err(ReportError::Encode(e));
            }
        };
        let timestamp = Utc::now().timestamp().to_string();
        let signature = signer::sign(&self.secret, &timestamp, &body);
        let report = SignedReport {
            timestamp,
            signature,
            body,
        };

        trace!(phase = "sending", bytes = report.body.len());
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            res = tokio::time::timeout(self.send_timeout, self.transport.send(&report)) => {
                res.unwrap_or(Err(TransportError::Timeout(self.send_timeout)))
            }
        };

        let status = match sent {
            Ok(status) => status,
            Err(e) => {
                trace!(phase = "rolling_back");
                self.store.restore(undo);
                debug!(
                    rolled_back_to = ?undo.state(),
                    "reconciliation rolled back after failed send"
                );
                return Err(e.into());
            }
        };

        trace!(phase = "committing");
        let persisted = match self.store.save(&self.state_path) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    path = %self.state_path.display(),
                    error = %e,
                    "failed to save state, keeping totals in memory"
                );
                false
            }
        };

        debug!(
            status,
            delta_rx = bandwidth.delta_rx_bytes,
            delta_tx = bandwidth.delta_tx_bytes,
            total_rx = bandwidth.total_rx_bytes,
            total_tx = bandwidth.total_tx_bytes,
            duration_ms = started.elapsed().as_millis() as u64,
            "report delivered"
        );

        Ok(CycleReport {
            bandwidth,
            reset: reconciled.reset,
            status,
            persisted,
        })
    }
}
