use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Defines when and how often a job should run. All times are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cadence {
    /// Run repeatedly every N minutes, counted from registration.
    Interval { minutes: u32 },

    /// Run every day at the given hour and minute.
    Daily { hour: u8, minute: u8 },

    /// Run once a week on `day` at the given time.
    Weekly { day: Weekday, hour: u8, minute: u8 },

    /// Run once a month on `day` (1–31) at the given time.
    /// Months shorter than `day` fire on their last day.
    Monthly { day: u8, hour: u8, minute: u8 },
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Interval { minutes } => write!(f, "every {minutes}m"),
            Cadence::Daily { hour, minute } => write!(f, "daily {hour:02}:{minute:02}"),
            Cadence::Weekly { day, hour, minute } => {
                write!(f, "weekly {day} {hour:02}:{minute:02}")
            }
            Cadence::Monthly { day, hour, minute } => {
                write!(f, "monthly day {day} {hour:02}:{minute:02}")
            }
        }
    }
}

/// Outcome of one dispatch of a job's action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// The body of a job. Errors are caught by the engine and never escape a tick.
#[async_trait]
pub trait JobAction: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> JobAction for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self) -> anyhow::Result<()> {
        (self.0)().await
    }
}

/// Wrap an async closure as a [`JobAction`].
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn JobAction>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnAction(f))
}

/// A job definition handed to [`crate::JobRegistry::register`].
#[derive(Clone)]
pub struct Job {
    /// Registry key; unique.
    pub name: String,
    pub description: String,
    pub cadence: Cadence,
    /// Disabled jobs stay registered but are never dispatched.
    pub enabled: bool,
    pub action: Arc<dyn JobAction>,
}

impl Job {
    pub fn new(name: impl Into<String>, cadence: Cadence, action: Arc<dyn JobAction>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            cadence,
            enabled: true,
            action,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("cadence", &self.cadence)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a registered job and its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub name: String,
    pub enabled: bool,
    pub description: String,
    pub cadence: Cadence,
    /// Start time of the most recent dispatch, if any.
    pub last_run: Option<DateTime<Utc>>,
    /// Next planned dispatch.
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u32,
    pub last_status: Option<RunStatus>,
}
