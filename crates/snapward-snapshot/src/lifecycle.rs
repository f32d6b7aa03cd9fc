use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use snapward_core::config::LifecycleConfig;
use snapward_core::TargetKind;
use tracing::{error, info, warn};

use crate::{
    client::ResourceClient,
    error::{Result, SnapshotError},
    naming::{generate_snapshot_id, SnapshotPattern},
    types::{
        LifecycleOutcome, PruneReport, SnapshotProgress, SnapshotStatus, SnapshotSummary,
        SnapshotTarget,
    },
};

/// The only target status that allows a new snapshot.
const READY_STATUS: &str = "available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Fixed delay between status checks; no backoff.
    pub poll_interval: Duration,
    /// `None` polls until the snapshot reaches a terminal state.
    pub max_poll_attempts: Option<u32>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from(&LifecycleConfig::default())
    }
}

impl From<&LifecycleConfig> for LifecycleSettings {
    fn from(cfg: &LifecycleConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
            max_poll_attempts: cfg.max_poll_attempts(),
        }
    }
}

/// Create one snapshot of a target, wait for it, then prune expired ones.
pub struct SnapshotLifecycle {
    client: Arc<dyn ResourceClient>,
    settings: LifecycleSettings,
}

impl SnapshotLifecycle {
    pub fn new(client: Arc<dyn ResourceClient>, settings: LifecycleSettings) -> Self {
        Self { client, settings }
    }

    /// One full lifecycle run. Never returns an error; failures land in
    /// [`LifecycleOutcome::Failed`].
    pub async fn run(&self, target: &SnapshotTarget) -> LifecycleOutcome {
        match self.try_run(target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    target = %target.identifier,
                    kind = %target.kind,
                    error = %e,
                    "snapshot lifecycle failed"
                );
                LifecycleOutcome::Failed(e)
            }
        }
    }

    async fn try_run(&self, target: &SnapshotTarget) -> Result<LifecycleOutcome> {
        let id = target.identifier.as_str();

        info!(target = id, kind = %target.kind, "checking target status");
        let status = match target.kind {
            TargetKind::Instance => self.client.instance_status(id).await?,
            TargetKind::Cluster => self.client.cluster_status(id).await?,
        };
        if status != READY_STATUS {
            warn!(target = id, %status, "target not available; skipping snapshot");
            return Ok(LifecycleOutcome::Skipped { status });
        }

        let snapshot_id = generate_snapshot_id(id, Utc::now().date_naive());
        info!(target = id, snapshot = %snapshot_id, "creating snapshot");
        match target.kind {
            TargetKind::Instance => {
                self.client
                    .create_instance_snapshot(id, &snapshot_id)
                    .await?
            }
            TargetKind::Cluster => self.client.create_cluster_snapshot(id, &snapshot_id).await?,
        }

        self.wait_until_available(target.kind, &snapshot_id).await?;
        info!(target = id, snapshot = %snapshot_id, "snapshot available");

        let prune = self.prune(target, Utc::now()).await?;
        Ok(LifecycleOutcome::Succeeded { snapshot_id, prune })
    }

    async fn wait_until_available(&self, kind: TargetKind, snapshot_id: &str) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            let SnapshotProgress { status, percent } = match kind {
                TargetKind::Instance => self.client.instance_snapshot_status(snapshot_id).await?,
                TargetKind::Cluster => self.client.cluster_snapshot_status(snapshot_id).await?,
            };
            attempts += 1;
            info!(snapshot = snapshot_id, %status, percent, attempt = attempts, "polling snapshot");

            match status {
                SnapshotStatus::Available => return Ok(()),
                SnapshotStatus::Failed => {
                    return Err(SnapshotError::LifecycleFailed {
                        snapshot_id: snapshot_id.to_string(),
                    })
                }
                SnapshotStatus::Creating | SnapshotStatus::Other(_) => {}
            }

            if let Some(max) = self.settings.max_poll_attempts {
                if attempts >= max {
                    return Err(SnapshotError::PollTimeout {
                        snapshot_id: snapshot_id.to_string(),
                        attempts,
                    });
                }
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Delete this tool's snapshots of `target` created before `now - retention`.
    ///
    /// A listing failure fails the run; a failed delete is logged and counted
    /// while the remaining candidates are still attempted.
    pub async fn prune(&self, target: &SnapshotTarget, now: DateTime<Utc>) -> Result<PruneReport> {
        let id = target.identifier.as_str();
        let cutoff = retention_cutoff(now, target.retention);
        info!(target = id, %cutoff, "pruning expired snapshots");

        let snapshots = match target.kind {
            TargetKind::Instance => self.client.list_manual_instance_snapshots(id).await?,
            TargetKind::Cluster => self.client.list_manual_cluster_snapshots(id).await?,
        };
        let candidates = deletion_candidates(&snapshots, id, cutoff)?;

        let mut report = PruneReport {
            candidates: candidates.len(),
            ..PruneReport::default()
        };
        for snapshot_id in candidates {
            let result = match target.kind {
                TargetKind::Instance => self.client.delete_instance_snapshot(snapshot_id).await,
                TargetKind::Cluster => self.client.delete_cluster_snapshot(snapshot_id).await,
            };
            match result {
                Ok(()) => {
                    report.deleted += 1;
                    info!(target = id, snapshot = snapshot_id, "deleted expired snapshot");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(target = id, snapshot = snapshot_id, error = %e, "failed to delete snapshot");
                }
            }
        }

        info!(
            target = id,
            candidates = report.candidates,
            deleted = report.deleted,
            failed = report.failed,
            "pruning complete"
        );
        Ok(report)
    }
}

/// Snapshots created strictly before this instant are expired.
pub fn retention_cutoff(now: DateTime<Utc>, retention: chrono::Duration) -> DateTime<Utc> {
    now - retention
}

/// Ids eligible for deletion: stamped, older than `cutoff`, and named by this tool.
pub fn deletion_candidates<'a>(
    snapshots: &'a [SnapshotSummary],
    identifier: &str,
    cutoff: DateTime<Utc>,
) -> Result<Vec<&'a str>> {
    let pattern =
        SnapshotPattern::for_target(identifier).map_err(|e| SnapshotError::InvalidTarget {
            identifier: identifier.to_string(),
            reason: e.to_string(),
        })?;
    Ok(snapshots
        .iter()
        .filter(|s| s.created_at.is_some_and(|t| t < cutoff))
        .filter(|s| pattern.matches(&s.id))
        .map(|s| s.id.as_str())
        .collect())
}
