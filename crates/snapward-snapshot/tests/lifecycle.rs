// Lifecycle and batch runs against an in-memory resource client.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use snapward_core::{CredentialsScope, TargetKind};
use snapward_snapshot::{
    naming::is_matching_pattern, ClientFactory, LifecycleOutcome, LifecycleSettings, RemoteError,
    ResourceClient, RunSummary, SnapshotError, SnapshotLifecycle, SnapshotProgress,
    SnapshotRunner, SnapshotStatus, SnapshotSummary, SnapshotTarget,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Status(String),
    Create(String, String),
    Poll(String),
    List(String),
    Delete(String),
}

#[derive(Default)]
struct FakeClient {
    kind: Option<TargetKind>,
    target_status: String,
    polls: Mutex<VecDeque<SnapshotProgress>>,
    existing: Vec<SnapshotSummary>,
    failing_deletes: HashSet<String>,
    fail_listing: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeClient {
    fn new(kind: TargetKind, target_status: &str) -> Self {
        Self {
            kind: Some(kind),
            target_status: target_status.to_string(),
            ..Self::default()
        }
    }

    fn with_polls(self, polls: &[(SnapshotStatus, u32)]) -> Self {
        *self.polls.lock().unwrap() = polls
            .iter()
            .map(|(status, percent)| SnapshotProgress {
                status: status.clone(),
                percent: *percent,
            })
            .collect();
        self
    }

    fn with_existing(mut self, snapshots: Vec<SnapshotSummary>) -> Self {
        self.existing = snapshots;
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn expect_kind(&self, kind: TargetKind) {
        assert_eq!(self.kind, Some(kind), "called the wrong family of operations");
    }

    fn status(&self, identifier: &str) -> Result<String, RemoteError> {
        self.record(Call::Status(identifier.into()));
        Ok(self.target_status.clone())
    }

    fn create(&self, identifier: &str, snapshot_id: &str) -> Result<(), RemoteError> {
        self.record(Call::Create(identifier.into(), snapshot_id.into()));
        Ok(())
    }

    fn poll(&self, snapshot_id: &str) -> Result<SnapshotProgress, RemoteError> {
        self.record(Call::Poll(snapshot_id.into()));
        let mut polls = self.polls.lock().unwrap();
        // the last scripted answer repeats
        let next = if polls.len() > 1 {
            polls.pop_front()
        } else {
            polls.front().cloned()
        };
        Ok(next.unwrap_or(SnapshotProgress {
            status: SnapshotStatus::Available,
            percent: 100,
        }))
    }

    fn list(&self, identifier: &str) -> Result<Vec<SnapshotSummary>, RemoteError> {
        self.record(Call::List(identifier.into()));
        if self.fail_listing {
            return Err(RemoteError::Api {
                status: 500,
                code: "InternalFailure".into(),
                message: "listing failed".into(),
            });
        }
        Ok(self.existing.clone())
    }

    fn delete(&self, snapshot_id: &str) -> Result<(), RemoteError> {
        self.record(Call::Delete(snapshot_id.into()));
        if self.failing_deletes.contains(snapshot_id) {
            return Err(RemoteError::Api {
                status: 400,
                code: "InvalidDBSnapshotState".into(),
                message: "snapshot is in use".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceClient for FakeClient {
    async fn instance_status(&self, identifier: &str) -> Result<String, RemoteError> {
        self.expect_kind(TargetKind::Instance);
        self.status(identifier)
    }

    async fn cluster_status(&self, identifier: &str) -> Result<String, RemoteError> {
        self.expect_kind(TargetKind::Cluster);
        self.status(identifier)
    }

    async fn create_instance_snapshot(&self, id: &str, snap: &str) -> Result<(), RemoteError> {
        self.expect_kind(TargetKind::Instance);
        self.create(id, snap)
    }

    async fn create_cluster_snapshot(&self, id: &str, snap: &str) -> Result<(), RemoteError> {
        self.expect_kind(TargetKind::Cluster);
        self.create(id, snap)
    }

    async fn instance_snapshot_status(&self, snap: &str) -> Result<SnapshotProgress, RemoteError> {
        self.expect_kind(TargetKind::Instance);
        self.poll(snap)
    }

    async fn cluster_snapshot_status(&self, snap: &str) -> Result<SnapshotProgress, RemoteError> {
        self.expect_kind(TargetKind::Cluster);
        self.poll(snap)
    }

    async fn list_manual_instance_snapshots(
        &self,
        id: &str,
    ) -> Result<Vec<SnapshotSummary>, RemoteError> {
        self.expect_kind(TargetKind::Instance);
        self.list(id)
    }

    async fn list_manual_cluster_snapshots(
        &self,
        id: &str,
    ) -> Result<Vec<SnapshotSummary>, RemoteError> {
        self.expect_kind(TargetKind::Cluster);
        self.list(id)
    }

    async fn delete_instance_snapshot(&self, snap: &str) -> Result<(), RemoteError> {
        self.expect_kind(TargetKind::Instance);
        self.delete(snap)
    }

    async fn delete_cluster_snapshot(&self, snap: &str) -> Result<(), RemoteError> {
        self.expect_kind(TargetKind::Cluster);
        self.delete(snap)
    }
}

fn scope() -> CredentialsScope {
    CredentialsScope {
        profile: None,
        region: "ap-northeast-2".into(),
    }
}

fn target(identifier: &str, kind: TargetKind) -> SnapshotTarget {
    SnapshotTarget::new(identifier, kind, chrono::Duration::days(90), scope()).unwrap()
}

fn fast() -> LifecycleSettings {
    LifecycleSettings {
        poll_interval: Duration::from_millis(1),
        max_poll_attempts: None,
    }
}

fn days_ago(days: i64) -> Option<chrono::DateTime<Utc>> {
    Some(Utc::now() - chrono::Duration::days(days))
}

fn summary(id: &str, created_at: Option<chrono::DateTime<Utc>>) -> SnapshotSummary {
    SnapshotSummary {
        id: id.to_string(),
        created_at,
    }
}

#[tokio::test]
async fn unavailable_target_is_skipped_without_side_effects() {
    let client = Arc::new(FakeClient::new(TargetKind::Instance, "modifying"));
    let lifecycle = SnapshotLifecycle::new(client.clone(), fast());

    let outcome = lifecycle.run(&target("db-1", TargetKind::Instance)).await;
    assert!(matches!(outcome, LifecycleOutcome::Skipped { ref status } if status == "modifying"));
    assert!(outcome.is_success());
    assert_eq!(client.calls(), [Call::Status("db-1".into())]);
}

#[tokio::test]
async fn db1_end_to_end_creates_polls_and_prunes() {
    let client = Arc::new(
        FakeClient::new(TargetKind::Instance, "available")
            .with_polls(&[
                (SnapshotStatus::Creating, 0),
                (SnapshotStatus::Creating, 40),
                (SnapshotStatus::Available, 100),
            ])
            .with_existing(vec![
                summary("db-1-2023-01-01-Ab3dEf12", days_ago(120)),
                summary("db-1-manual-backup", days_ago(400)),
                summary("db-1-2026-09-30-Zz9yXx87", days_ago(16)),
            ]),
    );
    let lifecycle = SnapshotLifecycle::new(client.clone(), fast());

    let outcome = lifecycle.run(&target("db-1", TargetKind::Instance)).await;
    let LifecycleOutcome::Succeeded { snapshot_id, prune } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert!(is_matching_pattern(&snapshot_id, "db-1"));
    assert!(snapshot_id.starts_with(&format!("db-1-{}-", Utc::now().format("%Y-%m-%d"))));
    assert_eq!(prune.candidates, 1);
    assert_eq!(prune.deleted, 1);
    assert_eq!(prune.failed, 0);

    let calls = client.calls();
    assert_eq!(calls[0], Call::Status("db-1".into()));
    assert_eq!(calls[1], Call::Create("db-1".into(), snapshot_id.clone()));
    let polls = calls.iter().filter(|c| matches!(c, Call::Poll(_))).count();
    assert_eq!(polls, 3);
    assert_eq!(calls[5], Call::List("db-1".into()));
    assert_eq!(
        calls.last(),
        Some(&Call::Delete("db-1-2023-01-01-Ab3dEf12".into()))
    );
    assert!(!calls.contains(&Call::Delete("db-1-manual-backup".into())));
}

#[tokio::test]
async fn failed_snapshot_fails_the_run_without_pruning() {
    let client = Arc::new(
        FakeClient::new(TargetKind::Instance, "available")
            .with_polls(&[(SnapshotStatus::Creating, 10), (SnapshotStatus::Failed, 10)])
            .with_existing(vec![summary("db-1-2023-01-01-Ab3dEf12", days_ago(365))]),
    );
    let lifecycle = SnapshotLifecycle::new(client.clone(), fast());

    let outcome = lifecycle.run(&target("db-1", TargetKind::Instance)).await;
    assert!(matches!(
        outcome,
        LifecycleOutcome::Failed(SnapshotError::LifecycleFailed { .. })
    ));
    assert!(!outcome.is_success());
    assert!(!client
        .calls()
        .iter()
        .any(|c| matches!(c, Call::List(_) | Call::Delete(_))));
}

#[tokio::test]
async fn one_failed_delete_does_not_stop_the_others() {
    let old = [
        "db-1-2024-01-01-AAAAAAAA",
        "db-1-2024-02-01-BBBBBBBB",
        "db-1-2024-03-01-CCCCCCCC",
        "db-1-2024-04-01-DDDDDDDD",
    ];
    let mut fake = FakeClient::new(TargetKind::Instance, "available")
        .with_existing(old.iter().map(|id| summary(id, days_ago(200))).collect());
    fake.failing_deletes.insert(old[1].to_string());
    let client = Arc::new(fake);
    let lifecycle = SnapshotLifecycle::new(client.clone(), fast());

    let report = lifecycle
        .prune(&target("db-1", TargetKind::Instance), Utc::now())
        .await
        .unwrap();
    assert_eq!(report.candidates, 4);
    assert_eq!(report.deleted, 3);
    assert_eq!(report.failed, 1);

    let deletes: Vec<Call> = client
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Delete(_)))
        .collect();
    let expected: Vec<Call> = old.iter().map(|id| Call::Delete(id.to_string())).collect();
    assert_eq!(deletes, expected);
}

#[tokio::test]
async fn listing_failure_fails_the_run() {
    let mut fake = FakeClient::new(TargetKind::Instance, "available");
    fake.fail_listing = true;
    let lifecycle = SnapshotLifecycle::new(Arc::new(fake), fast());

    let outcome = lifecycle.run(&target("db-1", TargetKind::Instance)).await;
    assert!(matches!(
        outcome,
        LifecycleOutcome::Failed(SnapshotError::Remote(RemoteError::Api { .. }))
    ));
}

#[tokio::test]
async fn poll_cap_reports_timeout() {
    let client = Arc::new(
        FakeClient::new(TargetKind::Cluster, "available")
            .with_polls(&[(SnapshotStatus::Other("copying".into()), 5)]),
    );
    let settings = LifecycleSettings {
        poll_interval: Duration::from_millis(1),
        max_poll_attempts: Some(3),
    };
    let lifecycle = SnapshotLifecycle::new(client.clone(), settings);

    let outcome = lifecycle.run(&target("orders", TargetKind::Cluster)).await;
    match outcome {
        LifecycleOutcome::Failed(SnapshotError::PollTimeout { attempts, .. }) => {
            assert_eq!(attempts, 3)
        }
        other => panic!("expected poll timeout, got {other:?}"),
    }
    let polls = client
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Poll(_)))
        .count();
    assert_eq!(polls, 3);
}

#[tokio::test]
async fn cluster_target_uses_cluster_operations() {
    let client = Arc::new(
        FakeClient::new(TargetKind::Cluster, "available")
            .with_existing(vec![summary("orders-2024-01-01-Ab3dEf12", days_ago(300))]),
    );
    let lifecycle = SnapshotLifecycle::new(client.clone(), fast());

    let outcome = lifecycle.run(&target("orders", TargetKind::Cluster)).await;
    assert!(matches!(outcome, LifecycleOutcome::Succeeded { prune, .. } if prune.deleted == 1));
}

#[tokio::test]
async fn batch_run_continues_past_failures_and_shares_clients() {
    let ok = Arc::new(FakeClient::new(TargetKind::Instance, "available"));
    let created = Arc::new(Mutex::new(Vec::<CredentialsScope>::new()));

    let factory: ClientFactory = {
        let ok = Arc::clone(&ok);
        let created = Arc::clone(&created);
        Arc::new(move |scope: &CredentialsScope| {
            created.lock().unwrap().push(scope.clone());
            match scope.profile.as_deref() {
                Some("broken") => Err(RemoteError::Credentials("no such profile".into())),
                _ => Ok(ok.clone() as Arc<dyn ResourceClient>),
            }
        })
    };
    let runner = SnapshotRunner::new(factory, fast());

    let mut broken = target("db-2", TargetKind::Instance);
    broken.scope.profile = Some("broken".into());
    let targets = vec![
        target("db-1", TargetKind::Instance),
        broken,
        target("db-3", TargetKind::Instance),
    ];

    let summary = runner.run_all(&targets).await;
    assert_eq!(
        summary,
        RunSummary {
            attempted: 3,
            succeeded: 2,
            skipped: 0,
            failed: 1
        }
    );
    // db-1 and db-3 share the default scope
    assert_eq!(created.lock().unwrap().len(), 2);
    let statuses: Vec<Call> = ok
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Status(_)))
        .collect();
    assert_eq!(
        statuses,
        [Call::Status("db-1".into()), Call::Status("db-3".into())]
    );
}

#[tokio::test]
async fn every_batch_builds_fresh_clients() {
    let ok = Arc::new(FakeClient::new(TargetKind::Instance, "available"));
    let built = Arc::new(Mutex::new(0usize));
    let factory: ClientFactory = {
        let ok = Arc::clone(&ok);
        let built = Arc::clone(&built);
        Arc::new(move |_scope: &CredentialsScope| {
            *built.lock().unwrap() += 1;
            Ok(ok.clone() as Arc<dyn ResourceClient>)
        })
    };
    let runner = SnapshotRunner::new(factory, fast());
    let targets = vec![
        target("db-1", TargetKind::Instance),
        target("db-3", TargetKind::Instance),
    ];

    for _ in 0..3 {
        let summary = runner.run_all(&targets).await;
        assert_eq!(summary.failed, 0);
    }
    // one shared scope per batch, re-resolved on each scheduled run
    assert_eq!(*built.lock().unwrap(), 3);
}

#[tokio::test]
async fn empty_batch_still_produces_a_summary() {
    let factory: ClientFactory = Arc::new(
        |_scope: &CredentialsScope| -> Result<Arc<dyn ResourceClient>, RemoteError> {
            Err(RemoteError::Credentials("unused".into()))
        },
    );
    let runner = SnapshotRunner::new(factory, fast());
    assert_eq!(runner.run_all(&[]).await, RunSummary::default());
}
