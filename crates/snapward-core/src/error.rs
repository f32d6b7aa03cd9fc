use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapwardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid target {identifier}: {reason}")]
    InvalidTarget { identifier: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SnapwardError>;
