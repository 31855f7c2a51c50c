use serde::Serialize;

/// Registry key of the periodic backup job.
pub const BACKUP_JOB_NAME: &str = "database-backup";

/// Error text of the degraded status record.
pub const NOT_INITIALIZED: &str = "Scheduler not initialized";

/// One collaborator call inside a backup cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStep {
    /// Obtaining the database client handle.
    Connect,
    /// Materialising the full backup artifact.
    Create,
    /// Shipping the artifact to remote storage.
    Upload,
    /// Removing backups beyond the retention count.
    Prune,
}

impl std::fmt::Display for BackupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackupStep::Connect => "connect",
            BackupStep::Create => "create",
            BackupStep::Upload => "upload",
            BackupStep::Prune => "prune",
        };
        write!(f, "{s}")
    }
}

/// What the upload step did with an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// The artifact reached remote storage.
    Uploaded,
    /// No remote storage is configured; the artifact stayed on this host.
    Skipped,
}

/// Result of a single scheduled firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every step succeeded. `uploaded` is false when the pipeline had no
    /// remote storage and kept the artifact locally.
    Completed { artifact: String, uploaded: bool },
    /// Another cycle was still in flight, nothing ran.
    Skipped,
    /// `step` failed and the remaining steps were abandoned.
    Failed { step: BackupStep, error: String },
}

/// Status report for the backup job. Never an error: a missing job yields
/// the [`Degraded`](ScheduleStatus::Degraded) variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ScheduleStatus {
    Active(ActiveSchedule),
    Degraded(DegradedSchedule),
}

impl ScheduleStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ScheduleStatus::Degraded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSchedule {
    pub enabled: bool,
    /// Whether the timer is currently armed (false after a stop).
    pub running: bool,
    pub cron_expression: String,
    pub timezone: String,
    /// UTC RFC 3339, `None` once the timer is stopped.
    pub next_run: Option<String>,
    pub next_run_local: String,
    pub last_run: Option<String>,
    pub last_run_local: String,
    pub server_time: String,
    pub server_time_local: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedSchedule {
    pub enabled: bool,
    pub cron_expression: String,
    pub error: String,
}
