use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::{
    history::{RunLog, RunRecord},
    registry::JobRegistry,
    types::{JobAction, RunStatus},
};

/// Observable loop state, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting for the next tick.
    Idle,
    /// Running the due jobs of the current tick.
    Dispatching,
    /// Shut down; terminal.
    Stopped,
}

/// Counts for one tick that had due work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Due jobs left unstarted because shutdown was requested mid-tick.
    pub skipped_for_shutdown: usize,
}

/// Source of "now" for the engine; swapped out in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Drives the registry: every tick, dispatch each enabled due job in turn.
pub struct SchedulerEngine {
    registry: Arc<JobRegistry>,
    tick_interval: Duration,
    run_log: Option<Arc<RunLog>>,
    state_tx: watch::Sender<EngineState>,
    clock: Clock,
}

impl SchedulerEngine {
    /// `tick` is clamped to at least one second.
    pub fn new(registry: Arc<JobRegistry>, tick: Duration) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Idle);
        Self {
            registry,
            tick_interval: tick.max(Duration::from_secs(1)),
            run_log: None,
            state_tx,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Append every finished dispatch to `log` and restore bookkeeping from it on start.
    pub fn with_run_log(mut self, log: Arc<RunLog>) -> Self {
        self.run_log = Some(log);
        self
    }

    pub fn state(&self) -> EngineState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// Main event loop. Ticks until `shutdown` broadcasts `true` or its sender drops.
    ///
    /// A job in flight when shutdown arrives runs to completion; the remaining
    /// due jobs of that tick are left for a future process.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.registry.is_empty().await {
            warn!("scheduler started with no registered jobs");
        }
        self.restore_from_log().await;

        for job in self.registry.list().await {
            info!(
                job = %job.name,
                enabled = job.enabled,
                cadence = %job.cadence,
                next_run = ?job.next_run,
                "scheduled job"
            );
        }
        info!(tick_secs = self.tick_interval.as_secs(), "scheduler engine started");

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(&shutdown).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }

        self.state_tx.send_replace(EngineState::Stopped);
        info!("scheduler engine shutting down");
    }

    /// Process every enabled job that is due now, one after another.
    ///
    /// Action errors and panics are logged and counted; they never abort the tick.
    pub async fn tick(&self, shutdown: &watch::Receiver<bool>) -> TickSummary {
        let now = (self.clock)();
        let due = self.registry.due_jobs(now).await;
        let mut summary = TickSummary::default();
        if due.is_empty() {
            return summary;
        }

        self.state_tx.send_replace(EngineState::Dispatching);
        let total = due.len();
        for (idx, job) in due.into_iter().enumerate() {
            if *shutdown.borrow() {
                summary.skipped_for_shutdown = total - idx;
                warn!(
                    remaining = summary.skipped_for_shutdown,
                    "shutdown requested; leaving due jobs for later"
                );
                break;
            }

            let started_at = (self.clock)().max(now);
            self.registry.mark_started(&job.name, started_at).await;
            info!(job = %job.name, "job dispatch started");

            let result = run_isolated(Arc::clone(&job.action)).await;
            let finished_at = (self.clock)().max(started_at);
            let (status, error_text) = match result {
                Ok(()) => {
                    summary.succeeded += 1;
                    (RunStatus::Succeeded, None)
                }
                Err(e) => {
                    summary.failed += 1;
                    let text = format!("{e:#}");
                    error!(job = %job.name, error = %text, "job failed");
                    (RunStatus::Failed, Some(text))
                }
            };
            summary.dispatched += 1;

            let next_run = self
                .registry
                .mark_finished(&job.name, finished_at, status)
                .await;
            info!(
                job = %job.name,
                %status,
                elapsed_ms = (finished_at - started_at).num_milliseconds(),
                next_run = ?next_run,
                "job dispatch finished"
            );

            if let Some(log) = &self.run_log {
                let record =
                    RunRecord::new(&job.name, started_at, finished_at, status, error_text);
                if let Err(e) = log.record(&record).await {
                    error!(job = %job.name, error = %e, "failed to append run log");
                }
            }
        }

        info!(
            dispatched = summary.dispatched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "scheduler tick complete"
        );
        self.state_tx.send_replace(EngineState::Idle);
        summary
    }

    async fn restore_from_log(&self) {
        let Some(log) = &self.run_log else {
            return;
        };
        match log.job_stats().await {
            Ok(stats) => {
                for s in stats {
                    if self
                        .registry
                        .restore(&s.job_name, s.last_run, s.run_count, s.last_status)
                        .await
                    {
                        info!(job = %s.job_name, runs = s.run_count, "restored job history");
                    }
                }
            }
            Err(e) => error!(error = %e, "could not read run log; starting with empty history"),
        }
    }
}

/// Run an action on its own task so a panic surfaces as a failed run.
async fn run_isolated(action: Arc<dyn JobAction>) -> anyhow::Result<()> {
    match tokio::spawn(async move { action.run().await }).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(anyhow::anyhow!("job panicked: {}", panic_message(e))),
        Err(e) => Err(anyhow::anyhow!("job task aborted: {e}")),
    }
}

fn panic_message(e: tokio::task::JoinError) -> String {
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
