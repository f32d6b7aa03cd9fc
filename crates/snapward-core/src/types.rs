use serde::{Deserialize, Serialize};
use std::fmt;

/// Which family of remote operations applies to a snapshot target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A single RDS DB instance.
    #[serde(alias = "rds")]
    Instance,
    /// An Aurora DB cluster.
    #[serde(alias = "aurora")]
    Cluster,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetKind::Instance => "instance",
            TargetKind::Cluster => "cluster",
        };
        write!(f, "{s}")
    }
}

/// The AWS session a target is managed through: a credentials profile plus a region.
///
/// Targets sharing a scope share one remote client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialsScope {
    /// Profile name in `~/.aws/credentials`. `None` means "default".
    pub profile: Option<String>,
    pub region: String,
}

impl fmt::Display for CredentialsScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.profile.as_deref().unwrap_or("default"),
            self.region
        )
    }
}
