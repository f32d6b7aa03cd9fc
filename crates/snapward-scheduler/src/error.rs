use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error from the run log.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The cadence definition is malformed or of an unsupported type.
    #[error("Invalid cadence: {0}")]
    InvalidCadence(String),

    /// A job with this name is already registered.
    #[error("Duplicate job: {name}")]
    DuplicateJob { name: String },

    /// No job with the given name exists in the registry.
    #[error("Job not found: {name}")]
    JobNotFound { name: String },

    /// The job descriptor names an action the catalog does not know.
    #[error("Unknown action '{action}' for job {job}")]
    UnknownAction { job: String, action: String },

    /// The action factory rejected the job descriptor.
    #[error("Action setup failed for job {job}: {reason}")]
    ActionSetup { job: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
