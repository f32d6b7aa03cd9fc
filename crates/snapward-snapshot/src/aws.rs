//! AWS request signing (SigV4) and credential resolution.
//!
//! Credentials come from, in order:
//!   - Environment variables: AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN
//!     (only when no profile is named)
//!   - Shared credentials file: `AWS_SHARED_CREDENTIALS_FILE` or ~/.aws/credentials
//!   - The EC2 instance role via IMDSv2 (only when no profile is named and
//!     `AWS_EC2_METADATA_DISABLED` is not `true`)

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::{error::RemoteError, imds::InstanceMetadata};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_PROFILE: &str = "default";

/// Static credentials for one AWS session.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Headers that authenticate one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
    pub security_token: Option<String>,
}

/// Sign a POST with a body of `content_type` for `service` in `region`.
pub fn sign_post(
    creds: &AwsCredentials,
    region: &str,
    service: &str,
    url: &Url,
    content_type: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<SignedHeaders, RemoteError> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let host = match (url.host_str(), url.port()) {
        (Some(h), Some(p)) => format!("{h}:{p}"),
        (Some(h), None) => h.to_string(),
        (None, _) => return Err(RemoteError::Parse(format!("endpoint has no host: {url}"))),
    };
    let path = url.path();

    let payload_hash = hex::encode(Sha256::digest(body));
    let mut canonical_headers =
        format!("content-type:{content_type}\nhost:{host}\nx-amz-date:{amz_date}\n");
    let mut signed_headers = "content-type;host;x-amz-date".to_string();
    if let Some(token) = &creds.session_token {
        canonical_headers.push_str(&format!("x-amz-security-token:{token}\n"));
        signed_headers.push_str(";x-amz-security-token");
    }

    let canonical_request =
        format!("POST\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");

    let credential_scope = format!("{date_stamp}/{region}/{service}/aws4_request");
    let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign =
        format!("AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{canonical_hash}");

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, service)?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);
    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    Ok(SignedHeaders {
        amz_date,
        authorization,
        security_token: creds.session_token.clone(),
    })
}

// ── SigV4 helpers ────────────────────────────────────────────────────────────

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, RemoteError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| RemoteError::Credentials(format!("invalid signing key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn derive_signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, RemoteError> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

// ── Credential resolution ────────────────────────────────────────────────────

/// Where a client gets the keys it signs with.
#[derive(Clone)]
pub enum CredentialSource {
    Static(AwsCredentials),
    /// Temporary keys of the EC2 instance role, refreshed before they expire.
    InstanceRole(Arc<InstanceMetadata>),
}

impl CredentialSource {
    pub async fn current(&self) -> Result<AwsCredentials, RemoteError> {
        match self {
            CredentialSource::Static(creds) => Ok(creds.clone()),
            CredentialSource::InstanceRole(imds) => imds.credentials().await,
        }
    }
}

impl From<AwsCredentials> for CredentialSource {
    fn from(creds: AwsCredentials) -> Self {
        CredentialSource::Static(creds)
    }
}

/// Static credentials when configured, else the instance role.
///
/// A named profile never falls back to the instance role.
pub fn resolve_credential_source(profile: Option<&str>) -> Result<CredentialSource, RemoteError> {
    match resolve_aws_credentials(profile) {
        Ok(creds) => Ok(CredentialSource::Static(creds)),
        Err(e) if profile.is_none() && !instance_metadata_disabled() => {
            debug!(reason = %e, "no static credentials; using the instance role");
            Ok(CredentialSource::InstanceRole(Arc::new(InstanceMetadata::from_env()?)))
        }
        Err(e) => Err(e),
    }
}

fn instance_metadata_disabled() -> bool {
    std::env::var("AWS_EC2_METADATA_DISABLED")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Resolve credentials for `profile`.
///
/// A named profile is read from the credentials file only, so a target bound
/// to another account never picks up the ambient environment keys.
pub fn resolve_aws_credentials(profile: Option<&str>) -> Result<AwsCredentials, RemoteError> {
    if profile.is_none() {
        if let (Ok(key_id), Ok(secret)) = (
            std::env::var("AWS_ACCESS_KEY_ID"),
            std::env::var("AWS_SECRET_ACCESS_KEY"),
        ) {
            return Ok(AwsCredentials {
                access_key_id: key_id,
                secret_access_key: secret,
                session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
            });
        }
    }

    let cred_path = credentials_file_path();
    let content = std::fs::read_to_string(&cred_path).map_err(|_| {
        RemoteError::Credentials(format!(
            "set AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY or configure {cred_path}"
        ))
    })?;
    parse_aws_credentials_file(&content, profile.unwrap_or(DEFAULT_PROFILE))
}

fn credentials_file_path() -> String {
    if let Ok(path) = std::env::var("AWS_SHARED_CREDENTIALS_FILE") {
        return path;
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.aws/credentials")
}

pub fn parse_aws_credentials_file(
    content: &str,
    profile: &str,
) -> Result<AwsCredentials, RemoteError> {
    let mut in_profile = false;
    let mut key_id = None;
    let mut secret = None;
    let mut session_token = None;

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_profile = line[1..line.len() - 1].trim() == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().to_string();
            match k.trim() {
                "aws_access_key_id" => key_id = Some(v),
                "aws_secret_access_key" => secret = Some(v),
                "aws_session_token" => session_token = Some(v),
                _ => {}
            }
        }
    }

    match (key_id, secret) {
        (Some(k), Some(s)) => Ok(AwsCredentials {
            access_key_id: k,
            secret_access_key: s,
            session_token,
        }),
        _ => Err(RemoteError::Credentials(format!(
            "profile '{profile}' not found or incomplete in credentials file"
        ))),
    }
}
