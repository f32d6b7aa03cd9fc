use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{db::init_db, error::Result, types::RunStatus};

/// One finished dispatch of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    /// UUIDv7 string, primary key.
    pub id: String,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Rendered error chain for failed runs.
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(
        job_name: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        status: RunStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            job_name: job_name.to_string(),
            started_at,
            finished_at,
            status,
            error,
        }
    }
}

/// Aggregate used to restore registry bookkeeping after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRunStats {
    pub job_name: String,
    pub last_run: DateTime<Utc>,
    pub run_count: u32,
    pub last_status: RunStatus,
}

/// Append-only SQLite log of job runs.
pub struct RunLog {
    conn: Mutex<Connection>,
}

impl RunLog {
    /// Open (or create) the log at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    /// Wrap an existing connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub async fn record(&self, run: &RunRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO job_runs (id, job_name, started_at, finished_at, status, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                run.id,
                run.job_name,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.status.to_string(),
                run.error,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, job_name, started_at, finished_at, status, error
             FROM job_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,         // id
                    row.get::<_, String>(1)?,         // job_name
                    row.get::<_, String>(2)?,         // started_at
                    row.get::<_, String>(3)?,         // finished_at
                    row.get::<_, String>(4)?,         // status
                    row.get::<_, Option<String>>(5)?, // error
                ))
            })?
            .filter_map(|r| {
                let (id, job_name, started_at, finished_at, status, error) = r.ok()?;
                Some(RunRecord {
                    id,
                    job_name,
                    started_at: parse_ts(&started_at)?,
                    finished_at: parse_ts(&finished_at)?,
                    status: status.parse().ok()?,
                    error,
                })
            })
            .collect();
        Ok(runs)
    }

    /// Run count, latest start and latest status per job name.
    pub async fn job_stats(&self) -> Result<Vec<JobRunStats>> {
        let conn = self.conn.lock().await;
        // SQLite takes bare columns from the row that produced MAX().
        let mut stmt = conn.prepare(
            "SELECT job_name, COUNT(*), MAX(started_at), status
             FROM job_runs GROUP BY job_name ORDER BY job_name",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .filter_map(|r| {
                let (job_name, run_count, last_run, status) = r.ok()?;
                Some(JobRunStats {
                    job_name,
                    last_run: parse_ts(&last_run)?,
                    run_count,
                    last_status: status.parse().ok()?,
                })
            })
            .collect();
        Ok(stats)
    }
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
