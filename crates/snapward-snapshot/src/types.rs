use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use snapward_core::config::{AwsConfig, TargetConfig};
use snapward_core::{CredentialsScope, SnapwardError, TargetKind};

use crate::error::{Result, SnapshotError};

/// RDS identifiers are capped at 63 characters.
const MAX_IDENTIFIER_LEN: usize = 63;

/// A database instance or cluster under snapshot management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotTarget {
    /// Remote instance/cluster name; also the prefix of every snapshot id.
    pub identifier: String,
    pub kind: TargetKind,
    /// Snapshots older than this are pruned.
    #[serde(skip)]
    pub retention: Duration,
    pub scope: CredentialsScope,
}

impl SnapshotTarget {
    /// Build a validated target.
    pub fn new(
        identifier: impl Into<String>,
        kind: TargetKind,
        retention: Duration,
        scope: CredentialsScope,
    ) -> Result<Self> {
        let identifier = identifier.into();
        validate_identifier(&identifier)?;
        if retention <= Duration::zero() {
            return Err(SnapshotError::InvalidTarget {
                identifier,
                reason: "retention period must be positive".into(),
            });
        }
        Ok(Self {
            identifier,
            kind,
            retention,
            scope,
        })
    }

    pub fn from_config(cfg: &TargetConfig, aws: &AwsConfig) -> Result<Self> {
        let days = cfg.retention_days().map_err(|e| match e {
            SnapwardError::InvalidTarget { identifier, reason } => {
                SnapshotError::InvalidTarget { identifier, reason }
            }
            other => SnapshotError::InvalidTarget {
                identifier: cfg.identifier.clone(),
                reason: other.to_string(),
            },
        })?;
        Self::new(
            cfg.identifier.clone(),
            cfg.kind,
            Duration::days(i64::from(days)),
            cfg.credentials_scope(aws),
        )
    }
}

/// Letters, digits and single hyphens; starts with a letter; no trailing hyphen.
fn validate_identifier(identifier: &str) -> Result<()> {
    let reason = if identifier.is_empty() {
        Some("identifier is empty")
    } else if identifier.len() > MAX_IDENTIFIER_LEN {
        Some("identifier is longer than 63 characters")
    } else if !identifier.starts_with(|c: char| c.is_ascii_alphabetic()) {
        Some("identifier must start with a letter")
    } else if !identifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        Some("identifier may only contain ASCII letters, digits and hyphens")
    } else if identifier.ends_with('-') || identifier.contains("--") {
        Some("identifier cannot end with a hyphen or contain two consecutive hyphens")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(SnapshotError::InvalidTarget {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Snapshot status as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SnapshotStatus {
    Creating,
    Available,
    Failed,
    /// Any other remote status; treated as still in progress.
    Other(String),
}

impl SnapshotStatus {
    pub fn from_remote(status: &str) -> Self {
        match status {
            "creating" => SnapshotStatus::Creating,
            "available" => SnapshotStatus::Available,
            "failed" => SnapshotStatus::Failed,
            other => SnapshotStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotStatus::Creating => write!(f, "creating"),
            SnapshotStatus::Available => write!(f, "available"),
            SnapshotStatus::Failed => write!(f, "failed"),
            SnapshotStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

/// One status poll of a snapshot being created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotProgress {
    pub status: SnapshotStatus,
    pub percent: u32,
}

/// A manual snapshot as listed for a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub id: String,
    /// `None` while the service has not stamped the snapshot yet.
    pub created_at: Option<DateTime<Utc>>,
}

/// What the pruning phase did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub candidates: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Result of one lifecycle run.
#[derive(Debug)]
pub enum LifecycleOutcome {
    /// The target was not `available`; nothing was created or deleted.
    Skipped { status: String },
    Succeeded {
        snapshot_id: String,
        prune: PruneReport,
    },
    Failed(SnapshotError),
}

impl LifecycleOutcome {
    /// Skips count as success; only `Failed` is a failure.
    pub fn is_success(&self) -> bool {
        !matches!(self, LifecycleOutcome::Failed(_))
    }
}

/// Totals for a batch run over several targets. Always produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    /// Includes skipped targets.
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &LifecycleOutcome) {
        self.attempted += 1;
        match outcome {
            LifecycleOutcome::Skipped { .. } => {
                self.succeeded += 1;
                self.skipped += 1;
            }
            LifecycleOutcome::Succeeded { .. } => self.succeeded += 1,
            LifecycleOutcome::Failed(_) => self.failed += 1,
        }
    }
}
