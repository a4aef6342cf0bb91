//! In-memory counter store and the reconciliation algorithm.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::file::{StateError, read_state_file, write_state_file};

/// Persisted bandwidth counters.
///
/// `boot_time == 0` means "never observed"; the first reconciliation always
/// rebases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CounterState {
    pub boot_time: u64,
    pub last_rx_bytes: u64,
    pub last_tx_bytes: u64,
    pub total_rx_bytes: u64,
    pub total_tx_bytes: u64,
}

/// Immutable copy of the counters, taken before a reconciliation so the
/// cycle can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    state: CounterState,
}

impl StateSnapshot {
    pub fn state(&self) -> CounterState {
        self.state
    }
}

/// Why a reconciliation rebased instead of computing a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// No prior observation, or the host boot time changed.
    Reboot,
    /// A raw counter went backwards without a reboot (interface re-created,
    /// driver reload, 32-bit wrap).
    CounterDecrease,
}

impl std::fmt::Display for ResetReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetReason::Reboot => write!(f, "reboot"),
            ResetReason::CounterDecrease => write!(f, "counter decrease"),
        }
    }
}

/// Output of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub delta_rx: u64,
    pub delta_tx: u64,
    pub total_rx: u64,
    pub total_tx: u64,
    /// `Some` when the baseline was reset and the deltas are zero.
    pub reset: Option<ResetReason>,
}

impl Reconciliation {
    pub fn reset_detected(&self) -> bool {
        self.reset.is_some()
    }
}

/// Mutex-guarded `CounterState`.
///
/// `snapshot`, `restore`, `reconcile`, `state` and `save` each hold the one
/// lock for their whole duration, so they never interleave.
#[derive(Debug, Default)]
pub struct CounterStore {
    inner: Mutex<CounterState>,
}

impl CounterStore {
    pub fn new(state: CounterState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Loads the store from `path`, falling back to a zeroed state.
    ///
    /// A missing or empty file is the normal first-run case. An unreadable or
    /// malformed file is logged and discarded: totals restart from zero
    /// rather than keeping the agent down.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable state file");
                Self::default()
            }
        }
    }

    /// Like [`CounterStore::load`] but surfaces read and decode errors.
    /// A missing or empty file still yields a zeroed store.
    pub fn try_load(path: &Path) -> Result<Self, StateError> {
        match read_state_file(path)? {
            Some(state) => {
                debug!(path = %path.display(), ?state, "state loaded");
                Ok(Self::new(state))
            }
            None => {
                debug!(path = %path.display(), "no prior state, starting from zero");
                Ok(Self::default())
            }
        }
    }

    /// Atomically writes the current counters to `path`.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let guard = self.lock();
        write_state_file(path, &guard)
    }

    /// Returns a copy of the current counters.
    pub fn state(&self) -> CounterState {
        *self.lock()
    }

    /// Takes an undo point.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot { state: *self.lock() }
    }

    /// Overwrites the counters with an undo point taken earlier.
    pub fn restore(&self, snapshot: StateSnapshot) {
        *self.lock() = snapshot.state;
    }

    /// Folds a new raw observation into the counters.
    ///
    /// A changed boot time or any counter going backwards rebases the
    /// baseline with a zero delta; bytes moved inside the reset window are
    /// dropped rather than risking a bogus huge delta.
    pub fn reconcile(&self, boot_time: u64, rx_bytes: u64, tx_bytes: u64) -> Reconciliation {
        let mut st = self.lock();

        let reset = if st.boot_time == 0 || st.boot_time != boot_time {
            Some(ResetReason::Reboot)
        } else if rx_bytes < st.last_rx_bytes || tx_bytes < st.last_tx_bytes {
            Some(ResetReason::CounterDecrease)
        } else {
            None
        };

        if let Some(reason) = reset {
            st.boot_time = boot_time;
            st.last_rx_bytes = rx_bytes;
            st.last_tx_bytes = tx_bytes;
            return Reconciliation {
                delta_rx: 0,
                delta_tx: 0,
                total_rx: st.total_rx_bytes,
                total_tx: st.total_tx_bytes,
                reset: Some(reason),
            };
        }

        let delta_rx = rx_bytes - st.last_rx_bytes;
        let delta_tx = tx_bytes - st.last_tx_bytes;
        st.total_rx_bytes = st.total_rx_bytes.saturating_add(delta_rx);
        st.total_tx_bytes = st.total_tx_bytes.saturating_add(delta_tx);
        st.last_rx_bytes = rx_bytes;
        st.last_tx_bytes = tx_bytes;

        Reconciliation {
            delta_rx,
            delta_tx,
            total_rx: st.total_rx_bytes,
            total_tx: st.total_tx_bytes,
            reset: None,
        }
    }

    // Counters are plain integers, so a panic elsewhere cannot leave them
    // half-written.
    fn lock(&self) -> MutexGuard<'_, CounterState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
