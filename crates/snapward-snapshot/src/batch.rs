use std::collections::HashMap;
use std::sync::Arc;

use snapward_core::CredentialsScope;
use tracing::{error, info};

use crate::{
    client::ResourceClient,
    error::{RemoteError, SnapshotError},
    lifecycle::{LifecycleSettings, SnapshotLifecycle},
    types::{LifecycleOutcome, RunSummary, SnapshotTarget},
};

/// Builds a remote client for one credentials scope.
pub type ClientFactory =
    Arc<dyn Fn(&CredentialsScope) -> Result<Arc<dyn ResourceClient>, RemoteError> + Send + Sync>;

/// Runs the lifecycle over many targets, one client per credentials scope.
///
/// Clients are built fresh for every batch, so rotated or expiring
/// credentials are picked up by the next scheduled run.
pub struct SnapshotRunner {
    factory: ClientFactory,
    settings: LifecycleSettings,
}

type ClientCache = HashMap<CredentialsScope, Arc<dyn ResourceClient>>;

impl SnapshotRunner {
    pub fn new(factory: ClientFactory, settings: LifecycleSettings) -> Self {
        Self { factory, settings }
    }

    /// Every target in order. A failed target never stops the rest.
    pub async fn run_all(&self, targets: &[SnapshotTarget]) -> RunSummary {
        let mut clients = ClientCache::new();
        let mut summary = RunSummary::default();
        for target in targets {
            let outcome = self.run_with(&mut clients, target).await;
            match &outcome {
                LifecycleOutcome::Skipped { status } => {
                    info!(target = %target.identifier, %status, "target skipped")
                }
                LifecycleOutcome::Succeeded { snapshot_id, prune } => info!(
                    target = %target.identifier,
                    snapshot = %snapshot_id,
                    pruned = prune.deleted,
                    "target snapshot complete"
                ),
                LifecycleOutcome::Failed(_) => {}
            }
            summary.record(&outcome);
        }

        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            "snapshot run summary"
        );
        summary
    }

    pub async fn run_one(&self, target: &SnapshotTarget) -> LifecycleOutcome {
        self.run_with(&mut ClientCache::new(), target).await
    }

    async fn run_with(&self, clients: &mut ClientCache, target: &SnapshotTarget) -> LifecycleOutcome {
        let client = match self.client_for(clients, &target.scope) {
            Ok(client) => client,
            Err(e) => {
                error!(target = %target.identifier, scope = %target.scope, error = %e, "no client for target");
                return LifecycleOutcome::Failed(SnapshotError::Remote(e));
            }
        };
        SnapshotLifecycle::new(client, self.settings)
            .run(target)
            .await
    }

    fn client_for(
        &self,
        clients: &mut ClientCache,
        scope: &CredentialsScope,
    ) -> Result<Arc<dyn ResourceClient>, RemoteError> {
        if let Some(client) = clients.get(scope) {
            return Ok(Arc::clone(client));
        }
        let client = (self.factory)(scope)?;
        info!(%scope, "created remote client");
        clients.insert(scope.clone(), Arc::clone(&client));
        Ok(client)
    }
}
