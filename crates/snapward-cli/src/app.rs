use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use snapward_core::config::{expand_home, AwsConfig, JobConfig};
use snapward_core::{CredentialsScope, SnapwardConfig};
use snapward_scheduler::catalog::register_from_config;
use snapward_scheduler::{action_fn, ActionCatalog, JobAction, JobRegistry, RunLog};
use snapward_snapshot::rds::RdsClient;
use snapward_snapshot::{
    ClientFactory, LifecycleSettings, RemoteError, ResourceClient, SnapshotRunner, SnapshotTarget,
};

/// Action name bound to snapshot jobs in the config file.
pub const SNAPSHOT_ACTION: &str = "snapshot";

/// One [`RdsClient`] per credentials scope, honouring `aws.endpoint_url`.
pub fn client_factory(aws: &AwsConfig) -> ClientFactory {
    let endpoint = aws.endpoint_url.clone();
    Arc::new(
        move |scope: &CredentialsScope| -> Result<Arc<dyn ResourceClient>, RemoteError> {
            let client = RdsClient::from_scope(scope)?;
            let client = match endpoint.as_deref() {
                Some(url) => client.with_endpoint(url)?,
                None => client,
            };
            Ok(Arc::new(client))
        },
    )
}

pub fn build_runner(config: &SnapwardConfig, factory: ClientFactory) -> Arc<SnapshotRunner> {
    Arc::new(SnapshotRunner::new(
        factory,
        LifecycleSettings::from(&config.lifecycle),
    ))
}

/// Resolve target identifiers against the config. An empty list selects every target.
pub fn resolve_targets(
    config: &SnapwardConfig,
    identifiers: &[String],
) -> anyhow::Result<Vec<SnapshotTarget>> {
    let selected: Vec<_> = if identifiers.is_empty() {
        config.targets.iter().collect()
    } else {
        identifiers
            .iter()
            .map(|id| {
                config
                    .target(id)
                    .with_context(|| format!("unknown target '{id}'"))
            })
            .collect::<anyhow::Result<_>>()?
    };
    selected
        .into_iter()
        .map(|t| SnapshotTarget::from_config(t, &config.aws).map_err(anyhow::Error::from))
        .collect()
}

/// Runs the lifecycle over the job's targets; fails if any target failed.
fn snapshot_action(targets: Vec<SnapshotTarget>, runner: Arc<SnapshotRunner>) -> Arc<dyn JobAction> {
    let targets = Arc::new(targets);
    action_fn(move || {
        let targets = Arc::clone(&targets);
        let runner = Arc::clone(&runner);
        async move {
            let summary = runner.run_all(&targets).await;
            anyhow::ensure!(
                summary.failed == 0,
                "{} of {} targets failed",
                summary.failed,
                summary.attempted
            );
            Ok(())
        }
    })
}

pub fn build_catalog(config: Arc<SnapwardConfig>, runner: Arc<SnapshotRunner>) -> ActionCatalog {
    let mut catalog = ActionCatalog::new();
    catalog.register(SNAPSHOT_ACTION, move |job: &JobConfig| {
        let targets = resolve_targets(&config, &job.targets)?;
        anyhow::ensure!(!targets.is_empty(), "no snapshot targets configured");
        Ok(snapshot_action(targets, Arc::clone(&runner)))
    });
    catalog
}

/// Registry populated from the configured jobs. Rejected jobs are logged, not fatal.
pub async fn build_registry(
    config: Arc<SnapwardConfig>,
    runner: Arc<SnapshotRunner>,
) -> Arc<JobRegistry> {
    let catalog = build_catalog(Arc::clone(&config), runner);
    let registry = Arc::new(JobRegistry::new());
    register_from_config(&registry, &catalog, &config.jobs).await;
    registry
}

/// Open the run log when `scheduler.history_path` is set.
pub fn open_run_log(config: &SnapwardConfig) -> anyhow::Result<Option<Arc<RunLog>>> {
    let Some(path) = config.scheduler.history_path.as_deref() else {
        return Ok(None);
    };
    let path = expand_home(path);
    ensure_parent_dir(&path);
    let log = RunLog::open(Path::new(&path))
        .with_context(|| format!("opening run log at {path}"))?;
    Ok(Some(Arc::new(log)))
}

/// Split a log file path into its directory (`.` when bare) and file name.
pub fn split_log_path(path: &str) -> anyhow::Result<(PathBuf, String)> {
    let path = Path::new(path);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("log path {} has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name.to_string()))
}

pub fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
