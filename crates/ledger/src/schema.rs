//! SQLite schema for the trial ledger.

use rusqlite::Connection;
use std::time::Duration;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS trials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workload TEXT NOT NULL,
    candidate TEXT NOT NULL,
    candidate_description TEXT NOT NULL,
    workload_description TEXT NOT NULL,
    source_reference TEXT NOT NULL,
    metric REAL NOT NULL,
    score REAL NOT NULL,
    recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_trials_workload ON trials(workload);
CREATE INDEX IF NOT EXISTS idx_trials_candidate ON trials(candidate);
";

/// Create the table and indexes if they don't exist.
///
/// WAL mode is persistent in the database file, so it only needs to be set here.
pub(crate) fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.execute_batch(SCHEMA_SQL)
}

/// Per-connection settings. `synchronous = FULL` so a committed append
/// survives a crash of the search process.
pub(crate) fn configure(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(Duration::from_millis(5000))?;
    conn.pragma_update(None, "synchronous", "FULL")
}
