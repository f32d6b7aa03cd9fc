// RdsClient against a mock Query API endpoint.

use snapward_snapshot::aws::AwsCredentials;
use snapward_snapshot::rds::RdsClient;
use snapward_snapshot::{RemoteError, ResourceClient, SnapshotStatus};
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> RdsClient {
    let creds = AwsCredentials {
        access_key_id: "AKIDEXAMPLE".into(),
        secret_access_key: "test-secret".into(),
        session_token: None,
    };
    RdsClient::new(creds, "ap-northeast-2".into())
        .unwrap()
        .with_endpoint(&server.uri())
        .unwrap()
}

fn xml(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "text/xml")
        .set_body_string(body.to_string())
}

#[tokio::test]
async fn instance_status_is_read_from_describe() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header_exists("authorization"))
        .and(header_exists("x-amz-date"))
        .and(body_string_contains("Action=DescribeDBInstances"))
        .and(body_string_contains("DBInstanceIdentifier=db-1"))
        .respond_with(xml(
            r#"<DescribeDBInstancesResponse xmlns="http://rds.amazonaws.com/doc/2014-10-31/">
  <DescribeDBInstancesResult>
    <DBInstances>
      <DBInstance>
        <DBInstanceIdentifier>db-1</DBInstanceIdentifier>
        <DBInstanceStatus>backing-up</DBInstanceStatus>
      </DBInstance>
    </DBInstances>
  </DescribeDBInstancesResult>
</DescribeDBInstancesResponse>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let status = client(&server).instance_status("db-1").await.unwrap();
    assert_eq!(status, "backing-up");

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0].headers.get("authorization").unwrap();
    assert!(auth
        .to_str()
        .unwrap()
        .contains("/ap-northeast-2/rds/aws4_request"));
}

#[tokio::test]
async fn error_response_becomes_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string(
                r#"<ErrorResponse xmlns="http://rds.amazonaws.com/doc/2014-10-31/">
  <Error>
    <Type>Sender</Type>
    <Code>DBClusterNotFoundFault</Code>
    <Message>DBCluster orders not found.</Message>
  </Error>
  <RequestId>0d1c</RequestId>
</ErrorResponse>"#,
            ),
        )
        .mount(&server)
        .await;

    let err = client(&server).cluster_status("orders").await.unwrap_err();
    match err {
        RemoteError::Api { status, code, .. } => {
            assert_eq!(status, 404);
            assert_eq!(code, "DBClusterNotFoundFault");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn empty_describe_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(xml(
            r#"<DescribeDBClustersResponse>
  <DescribeDBClustersResult><DBClusters/></DescribeDBClustersResult>
</DescribeDBClustersResponse>"#,
        ))
        .mount(&server)
        .await;

    let err = client(&server).cluster_status("orders").await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound { .. }));
}

#[tokio::test]
async fn manual_snapshot_listing_follows_markers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeDBSnapshots"))
        .and(body_string_contains("Marker=page-2"))
        .respond_with(xml(
            r#"<DescribeDBSnapshotsResponse>
  <DescribeDBSnapshotsResult>
    <DBSnapshots>
      <DBSnapshot>
        <DBSnapshotIdentifier>db-1-manual-backup</DBSnapshotIdentifier>
        <SnapshotCreateTime>2025-03-01T00:00:00Z</SnapshotCreateTime>
        <Status>available</Status>
        <PercentProgress>100</PercentProgress>
      </DBSnapshot>
    </DBSnapshots>
  </DescribeDBSnapshotsResult>
</DescribeDBSnapshotsResponse>"#,
        ))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeDBSnapshots"))
        .and(body_string_contains("SnapshotType=manual"))
        .respond_with(xml(
            r#"<DescribeDBSnapshotsResponse>
  <DescribeDBSnapshotsResult>
    <Marker>page-2</Marker>
    <DBSnapshots>
      <DBSnapshot>
        <DBSnapshotIdentifier>db-1-2023-01-01-Ab3dEf12</DBSnapshotIdentifier>
        <SnapshotCreateTime>2023-01-01T02:00:00.250Z</SnapshotCreateTime>
        <Status>available</Status>
        <PercentProgress>100</PercentProgress>
      </DBSnapshot>
      <DBSnapshot>
        <DBSnapshotIdentifier>db-1-2026-10-16-Qw3rTy12</DBSnapshotIdentifier>
        <Status>creating</Status>
      </DBSnapshot>
    </DBSnapshots>
  </DescribeDBSnapshotsResult>
</DescribeDBSnapshotsResponse>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let snapshots = client(&server)
        .list_manual_instance_snapshots("db-1")
        .await
        .unwrap();
    let ids: Vec<&str> = snapshots.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(
        ids,
        [
            "db-1-2023-01-01-Ab3dEf12",
            "db-1-2026-10-16-Qw3rTy12",
            "db-1-manual-backup"
        ]
    );
    assert!(snapshots[0].created_at.is_some());
    assert!(snapshots[1].created_at.is_none());
}

#[tokio::test]
async fn cluster_snapshot_progress_and_tagged_create() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=CreateDBClusterSnapshot"))
        .and(body_string_contains("DBClusterSnapshotIdentifier=orders-2026-10-16-Ab3dEf12"))
        .and(body_string_contains("Tags.Tag.1.Key=created-by"))
        .and(body_string_contains("Tags.Tag.1.Value=snapward"))
        .respond_with(xml("<CreateDBClusterSnapshotResponse/>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeDBClusterSnapshots"))
        .respond_with(xml(
            r#"<DescribeDBClusterSnapshotsResponse>
  <DescribeDBClusterSnapshotsResult>
    <DBClusterSnapshots>
      <DBClusterSnapshot>
        <DBClusterSnapshotIdentifier>orders-2026-10-16-Ab3dEf12</DBClusterSnapshotIdentifier>
        <Status>creating</Status>
        <PercentProgress>40</PercentProgress>
      </DBClusterSnapshot>
    </DBClusterSnapshots>
  </DescribeDBClusterSnapshotsResult>
</DescribeDBClusterSnapshotsResponse>"#,
        ))
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .create_cluster_snapshot("orders", "orders-2026-10-16-Ab3dEf12")
        .await
        .unwrap();
    let progress = client
        .cluster_snapshot_status("orders-2026-10-16-Ab3dEf12")
        .await
        .unwrap();
    assert_eq!(progress.status, SnapshotStatus::Creating);
    assert_eq!(progress.percent, 40);
}
