//! PerfStore: redb-backed persistence for the perf file.
//!
//! The whole [`PerfFile`] is JSON-serialized into a single record and
//! replaced in one write transaction on every save. The store supports both
//! on-disk and in-memory backends (the latter for testing and as a fallback
//! when the database file cannot be created).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe perf store backed by redb.
#[derive(Clone)]
pub struct PerfStore {
    db: Arc<Database>,
}

impl PerfStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "perf store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory perf store opened");
        Ok(store)
    }

    /// Open the store at `path`. A database that fails to open is removed
    /// and recreated; if that fails too, fall back to an in-memory store.
    pub fn open_or_recover(path: &Path) -> StateResult<Self> {
        match Self::open(path) {
            Ok(store) => return Ok(store),
            Err(e) => warn!(?path, error = %e, "perf store unreadable, recreating"),
        }

        if let Err(e) = std::fs::remove_file(path) {
            debug!(?path, error = %e, "could not remove perf store");
        }
        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!(?path, error = %e, "perf store not writable, history will not persist");
                Self::open_in_memory()
            }
        }
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PERF).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read the stored perf file as-is. `None` when nothing was saved yet.
    pub fn load(&self) -> StateResult<Option<PerfFile>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PERF).map_err(map_err!(Table))?;
        match table.get(CURRENT_KEY).map_err(map_err!(Read))? {
            Some(guard) => {
                let file: PerfFile =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Read and check the stored perf file.
    ///
    /// Any failure (unreadable record, other version, structural problem)
    /// discards the stored history: an empty file is written back and
    /// returned.
    pub fn load_validated(&self, bucket_count: usize) -> PerfFile {
        let result = self.load().and_then(|file| match file {
            None => Ok(PerfFile::empty()),
            Some(file) if file.version != PERF_FILE_VERSION => Err(StateError::VersionMismatch {
                found: file.version,
                expected: PERF_FILE_VERSION,
            }),
            Some(file) => file
                .validate(bucket_count)
                .map(|()| file)
                .map_err(StateError::Invalid),
        });

        match result {
            Ok(file) => {
                debug!(entries = file.log.len(), "perf file loaded");
                file
            }
            Err(e) => {
                warn!(error = %e, "discarding stored perf history");
                let empty = PerfFile::empty();
                if let Err(e) = self.save(&empty) {
                    warn!(error = %e, "failed to reset perf store");
                }
                empty
            }
        }
    }

    /// Replace the stored perf file.
    pub fn save(&self, file: &PerfFile) -> StateResult<()> {
        let value = serde_json::to_vec(file).map_err(map_err!(Serialize))?;
        self.put_raw(&value)?;
        debug!(entries = file.log.len(), bytes = value.len(), "perf file stored");
        Ok(())
    }

    fn put_raw(&self, value: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PERF).map_err(map_err!(Table))?;
            table.insert(CURRENT_KEY, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickscope_core::{Boundaries, Boundary, ThreadCounters};

    fn boundaries() -> Boundaries {
        Boundaries::try_new(vec![Boundary::Finite(0.05), Boundary::Inf], 2).unwrap()
    }

    fn sample_file() -> PerfFile {
        PerfFile {
            version: PERF_FILE_VERSION,
            last_boundaries: Some(boundaries()),
            log: vec![
                LogEntry::Boot { ts: 1_000, duration: 30 },
                LogEntry::Data(DataEntry {
                    ts: 301_000,
                    duration: 300_000,
                    samples: 1,
                    players: Some(12.0),
                    process_memory: Some(512.0 * 1024.0 * 1024.0),
                    aux_memory: Some(64.0 * 1024.0 * 1024.0),
                    perf: [(
                        "svMain".to_string(),
                        ThreadCounters { count: 6000, sum: 30.5, buckets: vec![5990, 10] },
                    )]
                    .into_iter()
                    .collect(),
                }),
            ],
        }
    }

    #[test]
    fn empty_store_loads_nothing() {
        let store = PerfStore::open_in_memory().unwrap();
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.load_validated(2), PerfFile::empty());
    }

    #[test]
    fn save_and_load() {
        let store = PerfStore::open_in_memory().unwrap();
        let file = sample_file();
        store.save(&file).unwrap();
        assert_eq!(store.load().unwrap(), Some(file.clone()));
        assert_eq!(store.load_validated(2), file);
    }

    #[test]
    fn save_replaces_previous_record() {
        let store = PerfStore::open_in_memory().unwrap();
        store.save(&sample_file()).unwrap();
        store.save(&PerfFile::empty()).unwrap();
        assert_eq!(store.load().unwrap(), Some(PerfFile::empty()));
    }

    #[test]
    fn corrupt_record_resets_store() {
        let store = PerfStore::open_in_memory().unwrap();
        store.put_raw(b"{not json").unwrap();
        assert!(matches!(store.load(), Err(StateError::Deserialize(_))));

        assert_eq!(store.load_validated(2), PerfFile::empty());
        assert_eq!(store.load().unwrap(), Some(PerfFile::empty()));
    }

    #[test]
    fn version_mismatch_resets_store() {
        let store = PerfStore::open_in_memory().unwrap();
        let mut file = sample_file();
        file.version = PERF_FILE_VERSION + 1;
        store.save(&file).unwrap();
        assert_eq!(store.load_validated(2), PerfFile::empty());
    }

    #[test]
    fn bucket_count_change_resets_store() {
        let store = PerfStore::open_in_memory().unwrap();
        store.save(&sample_file()).unwrap();
        assert_eq!(store.load_validated(15), PerfFile::empty());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.redb");

        {
            let store = PerfStore::open(&path).unwrap();
            store.save(&sample_file()).unwrap();
        }

        let store = PerfStore::open(&path).unwrap();
        assert_eq!(store.load_validated(2), sample_file());
    }

    #[test]
    fn garbage_database_file_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.redb");
        std::fs::write(&path, b"this is not a redb database").unwrap();

        let store = PerfStore::open_or_recover(&path).unwrap();
        assert!(store.load().unwrap().is_none());
        store.save(&sample_file()).unwrap();
        drop(store);

        let reopened = PerfStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(sample_file()));
    }
}
