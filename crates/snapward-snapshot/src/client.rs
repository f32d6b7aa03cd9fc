use async_trait::async_trait;

use crate::error::RemoteError;
use crate::types::{SnapshotProgress, SnapshotSummary};

/// The remote operations a snapshot lifecycle needs, for instances and clusters.
///
/// Implemented by [`crate::rds::RdsClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Current status string of a DB instance, e.g. `available`.
    async fn instance_status(&self, identifier: &str) -> Result<String, RemoteError>;

    async fn cluster_status(&self, identifier: &str) -> Result<String, RemoteError>;

    async fn create_instance_snapshot(
        &self,
        identifier: &str,
        snapshot_id: &str,
    ) -> Result<(), RemoteError>;

    async fn create_cluster_snapshot(
        &self,
        identifier: &str,
        snapshot_id: &str,
    ) -> Result<(), RemoteError>;

    async fn instance_snapshot_status(
        &self,
        snapshot_id: &str,
    ) -> Result<SnapshotProgress, RemoteError>;

    async fn cluster_snapshot_status(
        &self,
        snapshot_id: &str,
    ) -> Result<SnapshotProgress, RemoteError>;

    /// Every manual snapshot of the instance, across all pages.
    async fn list_manual_instance_snapshots(
        &self,
        identifier: &str,
    ) -> Result<Vec<SnapshotSummary>, RemoteError>;

    async fn list_manual_cluster_snapshots(
        &self,
        identifier: &str,
    ) -> Result<Vec<SnapshotSummary>, RemoteError>;

    async fn delete_instance_snapshot(&self, snapshot_id: &str) -> Result<(), RemoteError>;

    async fn delete_cluster_snapshot(&self, snapshot_id: &str) -> Result<(), RemoteError>;
}
