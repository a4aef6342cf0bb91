//! On-disk format for `CounterState`: one pretty-printed JSON object,
//! replaced atomically on every save.
//!
//! ```json
//! {
//!   "bootTime": 1700000000,
//!   "lastRxBytes": 1050000,
//!   "lastTxBytes": 420000,
//!   "totalRxBytes": 987654321,
//!   "totalTxBytes": 123456789
//! }
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::state::store::CounterState;

/// Error type for state file reads and writes.
#[derive(Debug)]
pub enum StateError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::Io(e) => write!(f, "state file I/O error: {}", e),
            StateError::Json(e) => write!(f, "state file is not valid JSON: {}", e),
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StateError::Io(e) => Some(e),
            StateError::Json(e) => Some(e),
        }
    }
}

impl From<io::Error> for StateError {
    fn from(e: io::Error) -> Self {
        StateError::Io(e)
    }
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::Json(e)
    }
}

/// Reads the state file. `Ok(None)` for a missing or blank file.
pub(crate) fn read_state_file(path: &Path) -> Result<Option<CounterState>, StateError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&data)?))
}

/// Writes the state file via a temporary sibling and an atomic rename.
///
/// Readers see either the previous file or the complete new one. On any
/// failure before the rename the temporary file is removed when the
/// `NamedTempFile` drops.
pub(crate) fn write_state_file(path: &Path, state: &CounterState) -> Result<(), StateError> {
    let data = serde_json::to_vec_pretty(state)?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".state-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    write_and_sync(&mut tmp, &data)?;
    tmp.persist(path).map_err(|e| StateError::Io(e.error))?;
    Ok(())
}

fn write_and_sync(tmp: &mut NamedTempFile, data: &[u8]) -> io::Result<()> {
    tmp.write_all(data)?;
    tmp.write_all(b"\n")?;
    tmp.flush()?;
    tmp.as_file().sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> CounterState {
        CounterState {
            boot_time: 1_700_000_000,
            last_rx_bytes: 1_050_000,
            last_tx_bytes: 420_000,
            total_rx_bytes: 987_654_321,
            total_tx_bytes: 123_456_789,
        }
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".state-"))
            .count()
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_state_file(&path, &sample()).unwrap();
        assert_eq!(read_state_file(&path).unwrap(), Some(sample()));
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[test]
    fn test_round_trip_extremes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        for state in [
            CounterState::default(),
            CounterState {
                boot_time: u64::MAX,
                last_rx_bytes: u64::MAX,
                last_tx_bytes: 0,
                total_rx_bytes: u64::MAX,
                total_tx_bytes: u64::MAX,
            },
        ] {
            write_state_file(&path, &state).unwrap();
            assert_eq!(read_state_file(&path).unwrap(), Some(state));
        }
    }

    #[test]
    fn test_wire_field_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_state_file(&path, &sample()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["bootTime"], 1_700_000_000u64);
        assert_eq!(value["lastRxBytes"], 1_050_000u64);
        assert_eq!(value["lastTxBytes"], 420_000u64);
        assert_eq!(value["totalRxBytes"], 987_654_321u64);
        assert_eq!(value["totalTxBytes"], 123_456_789u64);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("var/lib/vps-probe/state.json");
        write_state_file(&path, &sample()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_missing_and_blank_files_are_empty_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        assert_eq!(read_state_file(&path).unwrap(), None);

        fs::write(&path, "").unwrap();
        assert_eq!(read_state_file(&path).unwrap(), None);

        fs::write(&path, "  \n").unwrap();
        assert_eq!(read_state_file(&path).unwrap(), None);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{\"bootTime\": ").unwrap();
        assert!(matches!(read_state_file(&path), Err(StateError::Json(_))));

        fs::write(&path, "{\"bootTime\": -5}").unwrap();
        assert!(matches!(read_state_file(&path), Err(StateError::Json(_))));
    }

    #[test]
    fn test_partial_object_defaults_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"bootTime": 9, "totalRxBytes": 100, "extra": true}"#).unwrap();

        let state = read_state_file(&path).unwrap().unwrap();
        assert_eq!(state.boot_time, 9);
        assert_eq!(state.total_rx_bytes, 100);
        assert_eq!(state.last_rx_bytes, 0);
    }

    #[test]
    fn test_orphaned_temp_file_does_not_affect_later_saves() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_state_file(&path, &sample()).unwrap();

        // A writer killed between the temp write and the rename leaves only an
        // orphaned temp file behind.
        let orphan = dir.path().join(".state-killed.tmp");
        fs::write(&orphan, "{\"bootTime\": 1, \"lastRx").unwrap();
        assert_eq!(read_state_file(&path).unwrap(), Some(sample()));

        let next = CounterState {
            last_rx_bytes: 2_000_000,
            total_rx_bytes: 987_654_321 + 950_000,
            ..sample()
        };
        write_state_file(&path, &next).unwrap();

        assert_eq!(read_state_file(&path).unwrap(), Some(next));
        assert_eq!(
            fs::read_to_string(&orphan).unwrap(),
            "{\"bootTime\": 1, \"lastRx"
        );
        assert_eq!(leftover_temp_files(dir.path()), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_rename_keeps_target_and_cleans_temp() {
        let dir = tempdir().unwrap();
        // Renaming a file over a non-empty directory fails.
        let path = dir.path().join("state.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        assert!(write_state_file(&path, &sample()).is_err());
        assert!(path.join("keep").exists());
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }
}
