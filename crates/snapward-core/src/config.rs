use figment::{
    providers::{Env, Format, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SnapwardError;
use crate::types::{CredentialsScope, TargetKind};

pub const DEFAULT_TICK_SECS: u64 = 60; // scheduler due-check cadence
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10; // snapshot status re-check
pub const DEFAULT_REGION: &str = "ap-northeast-2";
pub const DEFAULT_RETENTION_MONTHS: u32 = 3;
pub const DAYS_PER_MONTH: u32 = 30;

/// Top-level config (snapward.toml / snapward.yml + SNAPWARD_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapwardConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-job checks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// SQLite file for the run log. Unset disables run history.
    pub history_path: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: DEFAULT_TICK_SECS,
            history_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Give up polling a new snapshot after this many checks. `0` polls forever.
    #[serde(default)]
    pub max_poll_attempts: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_poll_attempts: 0,
        }
    }
}

impl LifecycleConfig {
    pub fn max_poll_attempts(&self) -> Option<u32> {
        (self.max_poll_attempts > 0).then_some(self.max_poll_attempts)
    }
}

/// Default AWS session settings; individual targets may override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub profile: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Replaces `https://rds.{region}.amazonaws.com` (local stacks, tests).
    pub endpoint_url: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            profile: None,
            region: default_region(),
            endpoint_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for snapward crates when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also append plain-text logs to this file. Stderr output is always on.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// One database instance or cluster under snapshot management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub identifier: String,
    #[serde(alias = "type")]
    pub kind: TargetKind,
    /// Takes precedence over `retention_months` when both are set.
    pub retention_days: Option<u32>,
    pub retention_months: Option<u32>,
    pub profile: Option<String>,
    pub region: Option<String>,
}

impl TargetConfig {
    /// Retention window in whole days. Months count as 30 days.
    pub fn retention_days(&self) -> crate::error::Result<u32> {
        match (self.retention_days, self.retention_months) {
            (Some(days), _) => Ok(days),
            (None, Some(months)) => months.checked_mul(DAYS_PER_MONTH).ok_or_else(|| {
                SnapwardError::InvalidTarget {
                    identifier: self.identifier.clone(),
                    reason: format!("retention_months {months} is out of range"),
                }
            }),
            (None, None) => Ok(DEFAULT_RETENTION_MONTHS * DAYS_PER_MONTH),
        }
    }

    /// Resolve this target's session, falling back to the `[aws]` defaults.
    pub fn credentials_scope(&self, aws: &AwsConfig) -> CredentialsScope {
        CredentialsScope {
            profile: self.profile.clone().or_else(|| aws.profile.clone()),
            region: self.region.clone().unwrap_or_else(|| aws.region.clone()),
        }
    }
}

/// A named job descriptor. The action is resolved by name at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default = "default_action")]
    pub action: String,
    /// Target identifiers the action applies to. Empty means every target.
    #[serde(default)]
    pub targets: Vec<String>,
    pub schedule: ScheduleConfig,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

/// Declarative cadence as written in the config file.
///
/// `type` is one of `interval`, `daily`, `weekly`, `monthly`. Interval jobs
/// set `minutes`; the others set `at` (`"HH:MM"`, `"monday HH:MM"`, `"15 HH:MM"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub at: Option<String>,
    pub minutes: Option<u32>,
}

fn bool_true() -> bool {
    true
}
fn default_action() -> String {
    "snapshot".to_string()
}
fn default_tick_secs() -> u64 {
    DEFAULT_TICK_SECS
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_region() -> String {
    DEFAULT_REGION.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl SnapwardConfig {
    /// Load config from a TOML or YAML file with SNAPWARD_* env var overrides.
    ///
    /// The file format follows the extension (`.yml`/`.yaml` → YAML, else TOML).
    /// A missing file is not an error; defaults plus env overrides apply.
    /// Nested keys use a double underscore: `SNAPWARD_SCHEDULER__TICK_SECS=30`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading configuration");

        let figment = if is_yaml(&path) {
            Figment::new().merge(Yaml::file(&path))
        } else {
            Figment::new().merge(Toml::file(&path))
        };

        let config: SnapwardConfig = figment
            .merge(Env::prefixed("SNAPWARD_").split("__"))
            .extract()
            .map_err(|e| SnapwardError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn target(&self, identifier: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.identifier == identifier)
    }
}

fn is_yaml(path: &str) -> bool {
    path.ends_with(".yml") || path.ends_with(".yaml")
}

pub fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.snapward/snapward.toml", home)
}

/// Expand a leading `~/` to `$HOME`.
pub fn expand_home(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            format!("{home}/{rest}")
        }
        None => path.to_string(),
    }
}

/// Written by `snapward init` when no config exists yet.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# snapward configuration

[scheduler]
tick_secs = 60
# history_path = "~/.snapward/history.db"

[lifecycle]
poll_interval_secs = 10
# 0 = poll until the snapshot reaches a terminal state
max_poll_attempts = 0

[aws]
# profile = "default"
region = "ap-northeast-2"

[logging]
level = "info"
file = "~/.snapward/scheduler.log"

[[targets]]
identifier = "rds-instance-name"
kind = "instance"
retention_months = 3

[[targets]]
identifier = "cluster-name"
kind = "cluster"
retention_months = 3

[[jobs]]
name = "rds_backup"
action = "snapshot"
schedule = { type = "daily", at = "02:00" }
enabled = true
description = "RDS backup"
"#;
