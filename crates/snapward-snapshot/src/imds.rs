//! Instance role credentials from the EC2 instance metadata service (IMDSv2).
//!
//! A session token is requested with `PUT /latest/api/token`, then the role
//! name and its temporary keys are read from
//! `/latest/meta-data/iam/security-credentials/`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::{aws::AwsCredentials, error::RemoteError};

const DEFAULT_ENDPOINT: &str = "http://169.254.169.254/";
const TOKEN_PATH: &str = "latest/api/token";
const ROLE_PATH: &str = "latest/meta-data/iam/security-credentials/";
const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const TOKEN_TTL_SECS: &str = "21600";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// Refresh this long before the service-reported expiry.
const REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentials {
    code: Option<String>,
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expiration: Option<DateTime<Utc>>,
}

struct Cached {
    credentials: AwsCredentials,
    expires_at: Option<DateTime<Utc>>,
}

/// Fetches and caches the instance role's temporary credentials.
pub struct InstanceMetadata {
    client: reqwest::Client,
    endpoint: Url,
    cached: Mutex<Option<Cached>>,
}

impl InstanceMetadata {
    pub fn new(endpoint: &str) -> Result<Self, RemoteError> {
        let mut endpoint = Url::parse(endpoint).map_err(|e| {
            RemoteError::Credentials(format!("bad instance metadata endpoint {endpoint}: {e}"))
        })?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint,
            cached: Mutex::new(None),
        })
    }

    /// Honors `AWS_EC2_METADATA_SERVICE_ENDPOINT`.
    pub fn from_env() -> Result<Self, RemoteError> {
        let endpoint = std::env::var("AWS_EC2_METADATA_SERVICE_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Self::new(&endpoint)
    }

    /// Cached credentials, refetched once they are close to expiring.
    pub async fn credentials(&self) -> Result<AwsCredentials, RemoteError> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            let fresh = c
                .expires_at
                .is_some_and(|t| t - chrono::Duration::seconds(REFRESH_MARGIN_SECS) > Utc::now());
            if fresh {
                return Ok(c.credentials.clone());
            }
        }
        let fetched = self.fetch().await?;
        let credentials = fetched.credentials.clone();
        *cached = Some(fetched);
        Ok(credentials)
    }

    async fn fetch(&self) -> Result<Cached, RemoteError> {
        let token = self
            .client
            .put(self.url(TOKEN_PATH)?)
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?
            .text()
            .await
            .map_err(unavailable)?;

        let roles = self.get(ROLE_PATH, &token).await?;
        let role = roles
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| {
                RemoteError::Credentials("no IAM role attached to this instance".into())
            })?
            .to_string();
        debug!(%role, "reading instance role credentials");

        let body = self.get(&format!("{ROLE_PATH}{role}"), &token).await?;
        let creds: RoleCredentials = serde_json::from_str(&body).map_err(|e| {
            RemoteError::Credentials(format!("bad credentials document for role {role}: {e}"))
        })?;
        if let Some(code) = creds.code.as_deref().filter(|c| *c != "Success") {
            return Err(RemoteError::Credentials(format!(
                "instance role {role} credentials unavailable: {code}"
            )));
        }
        info!(%role, expires_at = ?creds.expiration, "loaded instance role credentials");

        Ok(Cached {
            credentials: AwsCredentials {
                access_key_id: creds.access_key_id,
                secret_access_key: creds.secret_access_key,
                session_token: creds.token,
            },
            expires_at: creds.expiration,
        })
    }

    async fn get(&self, path: &str, token: &str) -> Result<String, RemoteError> {
        self.client
            .get(self.url(path)?)
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?
            .text()
            .await
            .map_err(unavailable)
    }

    fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.endpoint
            .join(path)
            .map_err(|e| RemoteError::Credentials(format!("bad instance metadata path {path}: {e}")))
    }
}

fn unavailable(e: reqwest::Error) -> RemoteError {
    RemoteError::Credentials(format!("instance metadata service unavailable: {e}"))
}
