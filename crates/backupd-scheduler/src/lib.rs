//! `backupd-scheduler`: cron-driven database backup orchestration.
//!
//! # Overview
//!
//! A [`BackupScheduler`] owns one named [`CronJob`] in an injected
//! [`JobRegistry`]. Each firing runs the backup pipeline against a
//! [`BackupPipeline`] implementation:
//!
//! | Step      | Scheduled run | Manual trigger |
//! |-----------|---------------|----------------|
//! | `connect` | yes           | yes            |
//! | `create`  | yes           | yes            |
//! | `upload`  | yes           | yes            |
//! | `prune`   | yes           | no             |
//!
//! Scheduled failures are logged and swallowed so the timer keeps running;
//! manual failures are returned to the caller. Cycles never overlap: a
//! firing that finds another cycle in flight is skipped.

pub mod backup;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod schedule;
pub mod timer;
pub mod types;

pub use backup::BackupScheduler;
pub use error::{Result, SchedulerError};
pub use pipeline::BackupPipeline;
pub use registry::JobRegistry;
pub use schedule::CronSchedule;
pub use timer::{CronJob, JobCallback};
pub use types::{
    ActiveSchedule, BackupStep, CycleOutcome, DegradedSchedule, ScheduleStatus, UploadStatus,
    BACKUP_JOB_NAME,
};
