use thiserror::Error;

use backupd_core::CoreError;

use crate::types::BackupStep;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression could not be parsed.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The timezone is not a known IANA name.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// No job is registered under the given name.
    #[error("Job not found: {name}")]
    JobNotFound { name: String },

    /// Another backup cycle holds the in-flight guard.
    #[error("A backup cycle is already in progress")]
    BackupInProgress,

    /// One of the pipeline collaborators failed.
    #[error("Backup {step} step failed: {source}")]
    Collaborator {
        step: BackupStep,
        #[source]
        source: anyhow::Error,
    },
}

impl SchedulerError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            SchedulerError::InvalidTimezone(_) => "INVALID_TIMEZONE",
            SchedulerError::JobNotFound { .. } => "JOB_NOT_FOUND",
            SchedulerError::BackupInProgress => "BACKUP_IN_PROGRESS",
            SchedulerError::Collaborator { .. } => "BACKUP_FAILED",
        }
    }
}

impl From<CoreError> for SchedulerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Timezone(name) => SchedulerError::InvalidTimezone(name),
            CoreError::Config(msg) => SchedulerError::InvalidSchedule(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
