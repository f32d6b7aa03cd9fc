use rusqlite::Connection;

use crate::error::Result;

/// Initialise the run-log schema in `conn`.
///
/// Creates the `job_runs` table (idempotent) and an index on `job_name` so the
/// per-job restore query stays cheap as history grows.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS job_runs (
            id           TEXT    NOT NULL PRIMARY KEY,   -- UUIDv7, time-sortable
            job_name     TEXT    NOT NULL,
            started_at   TEXT    NOT NULL,               -- RFC 3339 UTC
            finished_at  TEXT    NOT NULL,
            status       TEXT    NOT NULL,               -- succeeded | failed
            error        TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_job_runs_job_name ON job_runs (job_name, started_at);
        ",
    )?;
    Ok(())
}
