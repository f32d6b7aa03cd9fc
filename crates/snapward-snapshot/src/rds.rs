//! [`ResourceClient`] over the RDS Query API.
//!
//! Every call is a SigV4-signed form POST; responses are XML documents.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use snapward_core::CredentialsScope;
use tracing::{debug, warn};
use url::Url;

use crate::{
    aws::{resolve_credential_source, sign_post, CredentialSource},
    client::ResourceClient,
    error::RemoteError,
    types::{SnapshotProgress, SnapshotStatus, SnapshotSummary},
};

const API_VERSION: &str = "2014-10-31";
const SERVICE: &str = "rds";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: &str = "100";
const TAG_KEY: &str = "created-by";
const TAG_VALUE: &str = "snapward";

pub struct RdsClient {
    client: reqwest::Client,
    credentials: CredentialSource,
    region: String,
    endpoint: Url,
}

impl RdsClient {
    pub fn new(
        credentials: impl Into<CredentialSource>,
        region: String,
    ) -> Result<Self, RemoteError> {
        let endpoint = Url::parse(&format!("https://rds.{region}.amazonaws.com/"))
            .map_err(|e| RemoteError::Parse(format!("bad RDS endpoint for region {region}: {e}")))?;
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            credentials: credentials.into(),
            region,
            endpoint,
        })
    }

    /// Resolve credentials for the scope's profile and build a client for its region.
    pub fn from_scope(scope: &CredentialsScope) -> Result<Self, RemoteError> {
        let source = resolve_credential_source(scope.profile.as_deref())?;
        Self::new(source, scope.region.clone())
    }

    /// Send requests to `endpoint` instead of the regional AWS endpoint.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, RemoteError> {
        self.endpoint = Url::parse(endpoint)
            .map_err(|e| RemoteError::Parse(format!("bad endpoint URL {endpoint}: {e}")))?;
        Ok(self)
    }

    /// One signed Query API call; returns the raw XML body of a 2xx response.
    async fn call(&self, action: &str, params: &[(&str, &str)]) -> Result<String, RemoteError> {
        let body = {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            form.append_pair("Action", action);
            form.append_pair("Version", API_VERSION);
            for (k, v) in params {
                form.append_pair(k, v);
            }
            form.finish()
        };

        let credentials = self.credentials.current().await?;
        let signed = sign_post(
            &credentials,
            &self.region,
            SERVICE,
            &self.endpoint,
            FORM_CONTENT_TYPE,
            body.as_bytes(),
            Utc::now(),
        )?;

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", FORM_CONTENT_TYPE)
            .header("x-amz-date", &signed.amz_date)
            .header("Authorization", &signed.authorization);
        if let Some(token) = &signed.security_token {
            builder = builder.header("x-amz-security-token", token);
        }

        debug!(action, region = %self.region, "RDS request");
        let resp = builder.body(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &text));
        }
        Ok(text)
    }

    async fn describe_snapshots(
        &self,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<SnapshotXml>, RemoteError> {
        let mut all = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let xml = {
                let mut page_params = params.to_vec();
                page_params.push(("MaxRecords", PAGE_SIZE));
                if let Some(m) = marker.as_deref() {
                    page_params.push(("Marker", m));
                }
                self.call(action, &page_params).await?
            };
            let page = parse_snapshot_page(action, &xml)?;
            all.extend(page.snapshots);
            match page.marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(all)
    }
}

fn api_error(status: u16, body: &str) -> RemoteError {
    match quick_xml::de::from_str::<ErrorResponse>(body) {
        Ok(resp) => RemoteError::Api {
            status,
            code: resp.error.code,
            message: resp.error.message,
        },
        Err(_) => RemoteError::Api {
            status,
            code: "Unknown".to_string(),
            message: body.chars().take(200).collect(),
        },
    }
}

fn decode<'de, T: Deserialize<'de>>(action: &str, xml: &'de str) -> Result<T, RemoteError> {
    quick_xml::de::from_str(xml)
        .map_err(|e| RemoteError::Parse(format!("{action} response: {e}")))
}

/// A create time that does not parse leaves the snapshot unprunable, so say so.
fn parse_create_time(snapshot_id: &str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            warn!(
                snapshot = %snapshot_id,
                create_time = raw,
                error = %e,
                "unparseable snapshot create time; snapshot will not be pruned"
            );
            None
        }
    }
}

struct SnapshotPage {
    snapshots: Vec<SnapshotXml>,
    marker: Option<String>,
}

fn parse_snapshot_page(action: &str, xml: &str) -> Result<SnapshotPage, RemoteError> {
    let (snapshots, marker) = if action == "DescribeDBClusterSnapshots" {
        let resp: DescribeDbClusterSnapshotsResponse = decode(action, xml)?;
        (resp.result.snapshots.items, resp.result.marker)
    } else {
        let resp: DescribeDbSnapshotsResponse = decode(action, xml)?;
        (resp.result.snapshots.items, resp.result.marker)
    };
    Ok(SnapshotPage {
        snapshots,
        marker: non_empty(marker),
    })
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|m| !m.trim().is_empty())
}

impl SnapshotXml {
    fn progress(&self) -> SnapshotProgress {
        SnapshotProgress {
            status: SnapshotStatus::from_remote(&self.status),
            percent: self.percent_progress,
        }
    }

    fn summary(self) -> SnapshotSummary {
        SnapshotSummary {
            created_at: parse_create_time(&self.id, self.create_time.as_deref()),
            id: self.id,
        }
    }
}

#[async_trait]
impl ResourceClient for RdsClient {
    async fn instance_status(&self, identifier: &str) -> Result<String, RemoteError> {
        let xml = self
            .call("DescribeDBInstances", &[("DBInstanceIdentifier", identifier)])
            .await?;
        let resp: DescribeDbInstancesResponse = decode("DescribeDBInstances", &xml)?;
        resp.result
            .instances
            .items
            .into_iter()
            .next()
            .map(|i| i.status)
            .ok_or_else(|| RemoteError::NotFound {
                kind: "DB instance",
                id: identifier.to_string(),
            })
    }

    async fn cluster_status(&self, identifier: &str) -> Result<String, RemoteError> {
        let xml = self
            .call("DescribeDBClusters", &[("DBClusterIdentifier", identifier)])
            .await?;
        let resp: DescribeDbClustersResponse = decode("DescribeDBClusters", &xml)?;
        resp.result
            .clusters
            .items
            .into_iter()
            .next()
            .map(|c| c.status)
            .ok_or_else(|| RemoteError::NotFound {
                kind: "DB cluster",
                id: identifier.to_string(),
            })
    }

    async fn create_instance_snapshot(
        &self,
        identifier: &str,
        snapshot_id: &str,
    ) -> Result<(), RemoteError> {
        self.call(
            "CreateDBSnapshot",
            &[
                ("DBInstanceIdentifier", identifier),
                ("DBSnapshotIdentifier", snapshot_id),
                ("Tags.Tag.1.Key", TAG_KEY),
                ("Tags.Tag.1.Value", TAG_VALUE),
            ],
        )
        .await?;
        Ok(())
    }

    async fn create_cluster_snapshot(
        &self,
        identifier: &str,
        snapshot_id: &str,
    ) -> Result<(), RemoteError> {
        self.call(
            "CreateDBClusterSnapshot",
            &[
                ("DBClusterIdentifier", identifier),
                ("DBClusterSnapshotIdentifier", snapshot_id),
                ("Tags.Tag.1.Key", TAG_KEY),
                ("Tags.Tag.1.Value", TAG_VALUE),
            ],
        )
        .await?;
        Ok(())
    }

    async fn instance_snapshot_status(
        &self,
        snapshot_id: &str,
    ) -> Result<SnapshotProgress, RemoteError> {
        let xml = self
            .call("DescribeDBSnapshots", &[("DBSnapshotIdentifier", snapshot_id)])
            .await?;
        let resp: DescribeDbSnapshotsResponse = decode("DescribeDBSnapshots", &xml)?;
        resp.result
            .snapshots
            .items
            .first()
            .map(SnapshotXml::progress)
            .ok_or_else(|| RemoteError::NotFound {
                kind: "DB snapshot",
                id: snapshot_id.to_string(),
            })
    }

    async fn cluster_snapshot_status(
        &self,
        snapshot_id: &str,
    ) -> Result<SnapshotProgress, RemoteError> {
        let xml = self
            .call(
                "DescribeDBClusterSnapshots",
                &[("DBClusterSnapshotIdentifier", snapshot_id)],
            )
            .await?;
        let resp: DescribeDbClusterSnapshotsResponse = decode("DescribeDBClusterSnapshots", &xml)?;
        resp.result
            .snapshots
            .items
            .first()
            .map(SnapshotXml::progress)
            .ok_or_else(|| RemoteError::NotFound {
                kind: "DB cluster snapshot",
                id: snapshot_id.to_string(),
            })
    }

    async fn list_manual_instance_snapshots(
        &self,
        identifier: &str,
    ) -> Result<Vec<SnapshotSummary>, RemoteError> {
        let snapshots = self
            .describe_snapshots(
                "DescribeDBSnapshots",
                &[("DBInstanceIdentifier", identifier), ("SnapshotType", "manual")],
            )
            .await?;
        Ok(snapshots.into_iter().map(SnapshotXml::summary).collect())
    }

    async fn list_manual_cluster_snapshots(
        &self,
        identifier: &str,
    ) -> Result<Vec<SnapshotSummary>, RemoteError> {
        let snapshots = self
            .describe_snapshots(
                "DescribeDBClusterSnapshots",
                &[("DBClusterIdentifier", identifier), ("SnapshotType", "manual")],
            )
            .await?;
        Ok(snapshots.into_iter().map(SnapshotXml::summary).collect())
    }

    async fn delete_instance_snapshot(&self, snapshot_id: &str) -> Result<(), RemoteError> {
        self.call("DeleteDBSnapshot", &[("DBSnapshotIdentifier", snapshot_id)])
            .await?;
        Ok(())
    }

    async fn delete_cluster_snapshot(&self, snapshot_id: &str) -> Result<(), RemoteError> {
        self.call(
            "DeleteDBClusterSnapshot",
            &[("DBClusterSnapshotIdentifier", snapshot_id)],
        )
        .await?;
        Ok(())
    }
}

// ── RDS response documents ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Error")]
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Deserialize)]
struct DescribeDbInstancesResponse {
    #[serde(rename = "DescribeDBInstancesResult")]
    result: DbInstancesResult,
}

#[derive(Deserialize)]
struct DbInstancesResult {
    #[serde(rename = "DBInstances", default)]
    instances: DbInstanceList,
}

#[derive(Deserialize, Default)]
struct DbInstanceList {
    #[serde(rename = "DBInstance", default)]
    items: Vec<DbInstanceXml>,
}

#[derive(Deserialize)]
struct DbInstanceXml {
    #[serde(rename = "DBInstanceStatus")]
    status: String,
}

#[derive(Deserialize)]
struct DescribeDbClustersResponse {
    #[serde(rename = "DescribeDBClustersResult")]
    result: DbClustersResult,
}

#[derive(Deserialize)]
struct DbClustersResult {
    #[serde(rename = "DBClusters", default)]
    clusters: DbClusterList,
}

#[derive(Deserialize, Default)]
struct DbClusterList {
    #[serde(rename = "DBCluster", default)]
    items: Vec<DbClusterXml>,
}

#[derive(Deserialize)]
struct DbClusterXml {
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Deserialize)]
struct DescribeDbSnapshotsResponse {
    #[serde(rename = "DescribeDBSnapshotsResult")]
    result: DbSnapshotsResult,
}

#[derive(Deserialize)]
struct DbSnapshotsResult {
    #[serde(rename = "Marker")]
    marker: Option<String>,
    #[serde(rename = "DBSnapshots", default)]
    snapshots: DbSnapshotList,
}

#[derive(Deserialize, Default)]
struct DbSnapshotList {
    #[serde(rename = "DBSnapshot", default)]
    items: Vec<SnapshotXml>,
}

#[derive(Deserialize)]
struct DescribeDbClusterSnapshotsResponse {
    #[serde(rename = "DescribeDBClusterSnapshotsResult")]
    result: DbClusterSnapshotsResult,
}

#[derive(Deserialize)]
struct DbClusterSnapshotsResult {
    #[serde(rename = "Marker")]
    marker: Option<String>,
    #[serde(rename = "DBClusterSnapshots", default)]
    snapshots: DbClusterSnapshotList,
}

#[derive(Deserialize, Default)]
struct DbClusterSnapshotList {
    #[serde(rename = "DBClusterSnapshot", default)]
    items: Vec<SnapshotXml>,
}

/// `<DBSnapshot>` and `<DBClusterSnapshot>` differ only in the id element.
#[derive(Deserialize)]
struct SnapshotXml {
    #[serde(rename = "DBSnapshotIdentifier", alias = "DBClusterSnapshotIdentifier")]
    id: String,
    #[serde(rename = "SnapshotCreateTime")]
    create_time: Option<String>,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "PercentProgress", default)]
    percent_progress: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cluster_snapshot_page() {
        let xml = r#"<DescribeDBClusterSnapshotsResponse xmlns="http://rds.amazonaws.com/doc/2014-10-31/">
  <DescribeDBClusterSnapshotsResult>
    <Marker>next-page</Marker>
    <DBClusterSnapshots>
      <DBClusterSnapshot>
        <DBClusterSnapshotIdentifier>orders-2026-01-01-Ab3dEf12</DBClusterSnapshotIdentifier>
        <DBClusterIdentifier>orders</DBClusterIdentifier>
        <SnapshotCreateTime>2026-01-01T02:00:13.512Z</SnapshotCreateTime>
        <Status>available</Status>
        <PercentProgress>100</PercentProgress>
      </DBClusterSnapshot>
      <DBClusterSnapshot>
        <DBClusterSnapshotIdentifier>orders-2026-10-16-Zz9yXx87</DBClusterSnapshotIdentifier>
        <Status>creating</Status>
        <PercentProgress>0</PercentProgress>
      </DBClusterSnapshot>
    </DBClusterSnapshots>
  </DescribeDBClusterSnapshotsResult>
  <ResponseMetadata><RequestId>abc</RequestId></ResponseMetadata>
</DescribeDBClusterSnapshotsResponse>"#;
        let page = parse_snapshot_page("DescribeDBClusterSnapshots", xml).unwrap();
        assert_eq!(page.marker.as_deref(), Some("next-page"));
        assert_eq!(page.snapshots.len(), 2);

        let mut snapshots = page.snapshots.into_iter();
        let first = snapshots.next().unwrap().summary();
        assert_eq!(first.id, "orders-2026-01-01-Ab3dEf12");
        assert_eq!(
            first.created_at.unwrap().to_rfc3339(),
            "2026-01-01T02:00:13.512+00:00"
        );
        let second = snapshots.next().unwrap();
        assert_eq!(second.progress().status, SnapshotStatus::Creating);
        assert!(second.summary().created_at.is_none());
    }

    #[test]
    fn garbled_create_time_is_dropped() {
        assert!(parse_create_time("db-1-x", Some("01/02/2026 02:00")).is_none());
        assert!(parse_create_time("db-1-x", None).is_none());
        assert!(parse_create_time("db-1-x", Some("2026-01-02T02:00:00+09:00")).is_some());
    }

    #[test]
    fn error_document_maps_to_api_error() {
        let body = r#"<ErrorResponse xmlns="http://rds.amazonaws.com/doc/2014-10-31/">
  <Error>
    <Type>Sender</Type>
    <Code>DBInstanceNotFound</Code>
    <Message>DBInstance db-9 not found.</Message>
  </Error>
  <RequestId>req-1</RequestId>
</ErrorResponse>"#;
        match api_error(404, body) {
            RemoteError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "DBInstanceNotFound");
                assert_eq!(message, "DBInstance db-9 not found.");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(
            api_error(503, "Service Unavailable"),
            RemoteError::Api { status: 503, ref code, .. } if code == "Unknown"
        ));
    }
}
