//! Append-only trial store backed by SQLite.
//!
//! Connections are opened around each read or write and dropped right after;
//! nothing is held open across a search iteration. The search controller is
//! the only writer, so no locking beyond SQLite's own is needed.

use crate::error::{Result, StorageError};
use crate::schema;
use crate::trial::{StoredTrial, Trial, TrialId};
use rusqlite::{params, Connection, OpenFlags, Row};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const SELECT_COLUMNS: &str = "SELECT id, recorded_at, workload, candidate, candidate_description, \
     workload_description, source_reference, metric, score FROM trials";

/// Handle to the experiment ledger. Cheap to clone; holds only the path.
#[derive(Debug, Clone)]
pub struct ExperimentLedger {
    path: PathBuf,
}

impl ExperimentLedger {
    /// Open or create the ledger database at `path`.
    ///
    /// Creates the parent directory and the schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path).map_err(|source| StorageError::Open {
            path: path.clone(),
            source,
        })?;
        schema::init_schema(&conn).map_err(|source| StorageError::Open {
            path: path.clone(),
            source,
        })?;

        Ok(Self { path })
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a short-lived connection. Does not create the file: a ledger whose
    /// database disappeared is unreachable, not empty.
    pub(crate) fn connect(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn =
            Connection::open_with_flags(&self.path, flags).map_err(|source| StorageError::Open {
                path: self.path.clone(),
                source,
            })?;
        schema::configure(&conn).map_err(|source| StorageError::Open {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    /// Record one trial. No dedup, no upsert.
    pub fn append(&self, trial: &Trial) -> Result<TrialId> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO trials (workload, candidate, candidate_description, \
             workload_description, source_reference, metric, score) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                trial.workload,
                trial.candidate,
                trial.candidate_description,
                trial.workload_description,
                trial.source_reference,
                trial.metric,
                trial.score,
            ],
        )
        .map_err(StorageError::Write)?;

        let id = TrialId(conn.last_insert_rowid());
        debug!(
            id = id.0,
            workload = %trial.workload,
            candidate = %trial.candidate,
            metric = trial.metric,
            score = trial.score,
            "trial recorded"
        );
        Ok(id)
    }

    /// All trials recorded for `workload` (exact match), in store order.
    pub fn query(&self, workload: &str) -> Result<Vec<StoredTrial>> {
        self.select(&format!("{SELECT_COLUMNS} WHERE workload = ?1 ORDER BY id"), workload)
    }

    /// Every trial of one candidate, in store order.
    pub fn candidate_history(&self, candidate: &str) -> Result<Vec<StoredTrial>> {
        self.select(&format!("{SELECT_COLUMNS} WHERE candidate = ?1 ORDER BY id"), candidate)
    }

    /// Total number of recorded trials.
    pub fn len(&self) -> Result<usize> {
        let conn = self.connect()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM trials", [], |row| row.get(0))
            .map_err(StorageError::Read)?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn select(&self, sql: &str, key: &str) -> Result<Vec<StoredTrial>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql).map_err(StorageError::Read)?;
        let rows = stmt
            .query_map(params![key], parse_row)
            .map_err(StorageError::Read)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::Read)
    }
}

fn parse_row(row: &Row<'_>) -> rusqlite::Result<StoredTrial> {
    Ok(StoredTrial {
        id: TrialId(row.get(0)?),
        recorded_at: row.get(1)?,
        trial: Trial {
            workload: row.get(2)?,
            candidate: row.get(3)?,
            candidate_description: row.get(4)?,
            workload_description: row.get(5)?,
            source_reference: row.get(6)?,
            metric: row.get(7)?,
            score: row.get(8)?,
        },
    })
}
