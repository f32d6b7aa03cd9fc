//! `snapward-snapshot`: manual snapshot lifecycle for RDS instances and Aurora clusters.
//!
//! One lifecycle run for a target:
//!
//! 1. check the target is `available` (otherwise the run is skipped),
//! 2. create `{identifier}-{YYYY-MM-DD}-{8 alphanumerics}`,
//! 3. poll until the snapshot is `available` or `failed`,
//! 4. delete this tool's snapshots older than the retention window.
//!
//! Remote calls go through the [`client::ResourceClient`] trait;
//! [`rds::RdsClient`] implements it against the RDS Query API.

pub mod aws;
pub mod batch;
pub mod client;
pub mod error;
pub mod imds;
pub mod lifecycle;
pub mod naming;
pub mod rds;
pub mod types;

pub use batch::{ClientFactory, SnapshotRunner};
pub use client::ResourceClient;
pub use error::{RemoteError, SnapshotError};
pub use lifecycle::{LifecycleSettings, SnapshotLifecycle};
pub use types::{
    LifecycleOutcome, PruneReport, RunSummary, SnapshotProgress, SnapshotStatus, SnapshotSummary,
    SnapshotTarget,
};
