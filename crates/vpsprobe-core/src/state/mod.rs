//! Persisted bandwidth counters.
//!
//! `CounterStore` turns raw interface counters, which restart on reboot and
//! occasionally go backwards, into cumulative totals that only grow. Each
//! reporting cycle takes a `StateSnapshot` before reconciling so that a
//! failed send can be undone exactly; the store is saved only after a
//! successful send.

mod file;
mod store;

pub use file::StateError;
pub use store::{CounterState, CounterStore, Reconciliation, ResetReason, StateSnapshot};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_file_is_zero() {
        let dir = tempdir().unwrap();
        let store = CounterStore::load(&dir.path().join("state.json"));
        assert_eq!(store.state(), CounterState::default());
    }

    #[test]
    fn test_load_malformed_file_fails_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json at all").unwrap();

        assert!(CounterStore::try_load(&path).is_err());
        let store = CounterStore::load(&path);
        assert_eq!(store.state(), CounterState::default());
    }

    #[test]
    fn test_save_then_load_reproduces_counters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = CounterStore::default();
        store.reconcile(100, 1000, 2000);
        store.reconcile(100, 1500, 2600);
        store.save(&path).unwrap();

        let loaded = CounterStore::load(&path);
        assert_eq!(loaded.state(), store.state());
        assert_eq!(loaded.state().total_rx_bytes, 500);
        assert_eq!(loaded.state().total_tx_bytes, 600);

        // Continues where the previous process stopped.
        let r = loaded.reconcile(100, 1700, 2600);
        assert_eq!(r.delta_rx, 200);
        assert_eq!(r.total_rx, 700);
    }

    #[test]
    fn test_save_overwrites_previous_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = CounterStore::default();
        store.reconcile(5, 10, 10);
        store.save(&path).unwrap();
        store.reconcile(5, 20, 30);
        store.save(&path).unwrap();

        assert_eq!(CounterStore::load(&path).state(), store.state());
    }
}
