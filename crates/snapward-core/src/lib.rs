//! `snapward-core`: configuration and shared types for the snapward workspace.

pub mod config;
pub mod error;
pub mod types;

pub use config::SnapwardConfig;
pub use error::{Result, SnapwardError};
pub use types::{CredentialsScope, TargetKind};
