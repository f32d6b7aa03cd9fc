use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    cadence::{advance, compute_next_run, is_due},
    error::{Result, SchedulerError},
    types::{Job, JobAction, JobInfo, RunStatus},
};

struct Entry {
    job: Job,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    run_count: u32,
    last_status: Option<RunStatus>,
}

impl Entry {
    fn info(&self) -> JobInfo {
        JobInfo {
            name: self.job.name.clone(),
            enabled: self.job.enabled,
            description: self.job.description.clone(),
            cadence: self.job.cadence,
            last_run: self.last_run,
            next_run: self.next_run,
            run_count: self.run_count,
            last_status: self.last_status,
        }
    }
}

/// A job selected for dispatch in the current tick.
pub(crate) struct DueJob {
    pub name: String,
    pub action: Arc<dyn JobAction>,
}

/// Named jobs plus their run bookkeeping, in insertion order.
///
/// Shared between the engine loop and management callers through an `Arc`.
/// The lock is never held while a job's action runs.
#[derive(Default)]
pub struct JobRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job, planning its first run from the current time.
    pub async fn register(&self, job: Job) -> Result<JobInfo> {
        self.register_at(job, Utc::now()).await
    }

    /// Register a job, planning its first run from `now`.
    ///
    /// Fails with `InvalidCadence` before anything is stored, and with
    /// `DuplicateJob` if the name is taken (the existing job is kept).
    pub async fn register_at(&self, job: Job, now: DateTime<Utc>) -> Result<JobInfo> {
        job.cadence.validate()?;
        let next_run = compute_next_run(&job.cadence, now).ok_or_else(|| {
            SchedulerError::InvalidCadence(format!("{} never fires", job.cadence))
        })?;

        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.job.name == job.name) {
            return Err(SchedulerError::DuplicateJob { name: job.name });
        }

        info!(
            job = %job.name,
            cadence = %job.cadence,
            enabled = job.enabled,
            next_run = %next_run,
            "job registered"
        );
        let entry = Entry {
            job,
            last_run: None,
            next_run: Some(next_run),
            run_count: 0,
            last_status: None,
        };
        let info = entry.info();
        entries.push(entry);
        Ok(info)
    }

    /// Remove a job and its bookkeeping. Returns `false` if it was not registered.
    pub async fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.job.name != name);
        let removed = entries.len() != before;
        if removed {
            info!(job = %name, "job removed");
        }
        removed
    }

    /// Flip the enabled flag. Bookkeeping and `next_run` are left alone.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.job.name == name)
            .ok_or_else(|| SchedulerError::JobNotFound {
                name: name.to_string(),
            })?;
        entry.job.enabled = enabled;
        info!(job = %name, enabled, "job enabled flag changed");
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<JobInfo> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.job.name == name).map(Entry::info)
    }

    /// All jobs in registration order, disabled ones included.
    pub async fn list(&self) -> Vec<JobInfo> {
        self.entries.read().await.iter().map(Entry::info).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Seed bookkeeping from a previous process (run log). `next_run` is kept.
    pub async fn restore(
        &self,
        name: &str,
        last_run: DateTime<Utc>,
        run_count: u32,
        last_status: RunStatus,
    ) -> bool {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.job.name == name) {
            Some(entry) => {
                entry.last_run = Some(entry.last_run.map_or(last_run, |prev| prev.max(last_run)));
                entry.run_count = entry.run_count.max(run_count);
                entry.last_status = Some(last_status);
                true
            }
            None => false,
        }
    }

    /// Enabled jobs whose `next_run` has arrived, in registration order.
    pub(crate) async fn due_jobs(&self, now: DateTime<Utc>) -> Vec<DueJob> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.job.enabled && is_due(e.next_run, now))
            .map(|e| DueJob {
                name: e.job.name.clone(),
                action: Arc::clone(&e.job.action),
            })
            .collect()
    }

    /// Record the dispatch start. `last_run` never moves backwards.
    pub(crate) async fn mark_started(&self, name: &str, at: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.job.name == name) {
            Some(entry) => {
                entry.last_run = Some(entry.last_run.map_or(at, |prev| prev.max(at)));
            }
            None => warn!(job = %name, "job vanished before dispatch"),
        }
    }

    /// Record the outcome and plan the next run. Returns the new `next_run`.
    pub(crate) async fn mark_finished(
        &self,
        name: &str,
        now: DateTime<Utc>,
        status: RunStatus,
    ) -> Option<DateTime<Utc>> {
        let mut entries = self.entries.write().await;
        let entry = entries.iter_mut().find(|e| e.job.name == name)?;
        let scheduled = entry.next_run.unwrap_or(now);
        entry.next_run = advance(&entry.job.cadence, scheduled, now);
        entry.run_count += 1;
        entry.last_status = Some(status);
        entry.next_run
    }
}
