//! StateStore: redb-backed record persistence for the edge node.
//!
//! Provides the record operations the meta-manager and clients rely on
//! (insert, insert-or-update, delete, query by key, query by type) plus
//! the node-task job records. Values are JSON-serialized into redb's
//! `&[u8]` columns. Supports on-disk and in-memory backends.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// `map_err!(Read)` → closure turning any `Display` error into `StateError::Read`.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const EMPTY: &[u8] = &[];

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
        }
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.open_table(RECORDS_BY_TYPE).map_err(map_err!(Table))?;
        txn.open_table(TASK_RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Records ────────────────────────────────────────────────────

    /// Insert a new record. Fails with `AlreadyExists` if the key is taken.
    pub fn insert(&self, record: &Record) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut records = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            if records
                .get(record.key.as_str())
                .map_err(map_err!(Read))?
                .is_some()
            {
                return Err(StateError::AlreadyExists(record.key.clone()));
            }
            records
                .insert(record.key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let mut index = txn.open_table(RECORDS_BY_TYPE).map_err(map_err!(Table))?;
            let index_key = type_index_key(&record.record_type, &record.key);
            index
                .insert(index_key.as_str(), EMPTY)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(key = %record.key, "record inserted");
        Ok(())
    }

    /// Insert the record, replacing any existing record at the same key.
    pub fn insert_or_update(&self, record: &Record) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut records = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            let previous = records
                .insert(record.key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?
                .map(|guard| guard.value().to_vec());

            let mut index = txn.open_table(RECORDS_BY_TYPE).map_err(map_err!(Table))?;
            if let Some(previous) = previous {
                let previous = decode_record(&previous)?;
                if previous.record_type != record.record_type {
                    let stale = type_index_key(&previous.record_type, &previous.key);
                    index.remove(stale.as_str()).map_err(map_err!(Write))?;
                }
            }
            let index_key = type_index_key(&record.record_type, &record.key);
            index
                .insert(index_key.as_str(), EMPTY)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(key = %record.key, "record stored");
        Ok(())
    }

    /// Delete a record by key. Returns true if it existed.
    pub fn delete_by_key(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut records = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            let removed = records
                .remove(key)
                .map_err(map_err!(Write))?
                .map(|guard| guard.value().to_vec());
            existed = removed.is_some();

            if let Some(removed) = removed {
                let removed = decode_record(&removed)?;
                let mut index = txn.open_table(RECORDS_BY_TYPE).map_err(map_err!(Table))?;
                let index_key = type_index_key(&removed.record_type, &removed.key);
                index.remove(index_key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "record deleted");
        Ok(existed)
    }

    /// Look up the record stored at `key`.
    pub fn query_by_key(&self, key: &str) -> StateResult<Option<Record>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let records = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match records.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode_record(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All records of the given type, ordered by key.
    pub fn query_by_type(&self, record_type: &str) -> StateResult<Vec<Record>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(RECORDS_BY_TYPE).map_err(map_err!(Table))?;
        let records = txn.open_table(RECORDS).map_err(map_err!(Table))?;

        let (start, end) = type_index_range(record_type);
        let prefix_len = start.len();
        let mut results = Vec::new();
        for entry in index
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
        {
            let (index_key, _) = entry.map_err(map_err!(Read))?;
            let key = &index_key.value()[prefix_len..];
            if let Some(guard) = records.get(key).map_err(map_err!(Read))? {
                results.push(decode_record(guard.value())?);
            }
        }
        Ok(results)
    }

    // ── Node-task records ──────────────────────────────────────────

    /// Persist the job intent for a node-task resource type.
    pub fn put_task_record(&self, resource_type: &str, record: &TaskRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TASK_RECORDS).map_err(map_err!(Table))?;
            table
                .insert(resource_type, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%resource_type, job = %record.job_name, "task record stored");
        Ok(())
    }

    pub fn get_task_record(&self, resource_type: &str) -> StateResult<Option<TaskRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASK_RECORDS).map_err(map_err!(Table))?;
        match table.get(resource_type).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: TaskRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Delete the job intent. Returns true if it existed.
    pub fn delete_task_record(&self, resource_type: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(TASK_RECORDS).map_err(map_err!(Table))?;
            existed = table.remove(resource_type).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%resource_type, existed, "task record deleted");
        Ok(existed)
    }
}

fn decode_record(bytes: &[u8]) -> StateResult<Record> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}
