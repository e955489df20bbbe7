//! Durable checkpoint store for workflow runs, backed by redb.
//!
//! One table keyed by thread id, values JSON-encoded [`WorkflowRun`]s.
//! Saves are transactional, so a reader never observes a partially written
//! run; isolation is per key, with no global lock across threads.

use std::fmt::Display;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{ConveyorError, Result};
use crate::run::WorkflowRun;

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: thread id. Value: JSON-encoded WorkflowRun.
const RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("runs");

fn store_err(e: impl Display) -> ConveyorError {
    ConveyorError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// CheckpointStore
// ---------------------------------------------------------------------------

pub struct CheckpointStore {
    db: Database,
}

impl CheckpointStore {
    /// Open or create the store at `path`, ensuring the table exists before
    /// any reads.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(RUNS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    /// Persist a run, replacing any previous snapshot for its thread id.
    pub fn save(&self, run: &WorkflowRun) -> Result<()> {
        let value = serde_json::to_vec(run)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(RUNS).map_err(store_err)?;
            table
                .insert(run.thread_id.as_str(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    pub fn load(&self, thread_id: &str) -> Result<WorkflowRun> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(RUNS).map_err(store_err)?;
        let entry = table
            .get(thread_id)
            .map_err(store_err)?
            .ok_or_else(|| ConveyorError::NotFound(thread_id.to_string()))?;
        let run: WorkflowRun = serde_json::from_slice(entry.value())?;
        Ok(run)
    }

    pub fn exists(&self, thread_id: &str) -> Result<bool> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(RUNS).map_err(store_err)?;
        Ok(table.get(thread_id).map_err(store_err)?.is_some())
    }

    /// Remove a run. Missing ids fail with `NotFound`.
    pub fn delete(&self, thread_id: &str) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let removed = {
            let mut table = wt.open_table(RUNS).map_err(store_err)?;
            let existed = table.remove(thread_id).map_err(store_err)?.is_some();
            existed
        };
        wt.commit().map_err(store_err)?;
        if removed {
            Ok(())
        } else {
            Err(ConveyorError::NotFound(thread_id.to_string()))
        }
    }

    /// All stored thread ids, in key order.
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(RUNS).map_err(store_err)?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (key, _) = entry.map_err(store_err)?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
