use thiserror::Error;

/// A call to the remote resource manager failed.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error document.
    #[error("RDS API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("AWS credentials unavailable: {0}")]
    Credentials(String),

    /// The describe call succeeded but returned no matching resource.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

/// Why a lifecycle run failed.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The service reported the new snapshot as `failed`.
    #[error("snapshot {snapshot_id} failed during creation")]
    LifecycleFailed { snapshot_id: String },

    /// Polling gave up before the snapshot reached a terminal state.
    #[error("snapshot {snapshot_id} still not available after {attempts} checks")]
    PollTimeout { snapshot_id: String, attempts: u32 },

    #[error("invalid target {identifier}: {reason}")]
    InvalidTarget { identifier: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
