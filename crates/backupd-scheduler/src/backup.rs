use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backupd_core::display;
use backupd_core::ScheduleConfig;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures_util::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::{Result, SchedulerError},
    pipeline::BackupPipeline,
    registry::JobRegistry,
    schedule::CronSchedule,
    timer::{CronJob, JobCallback},
    types::{
        ActiveSchedule, BackupStep, CycleOutcome, DegradedSchedule, ScheduleStatus, UploadStatus,
        BACKUP_JOB_NAME, NOT_INITIALIZED,
    },
};

/// Registers, runs, stops and reports on the periodic database backup.
///
/// The job lives in the injected [`JobRegistry`] under [`BACKUP_JOB_NAME`];
/// the scheduler itself only keeps the frozen config and the pipeline.
pub struct BackupScheduler<P: BackupPipeline> {
    config: ScheduleConfig,
    display_tz: Tz,
    registry: Arc<JobRegistry>,
    runner: CycleRunner<P>,
}

impl<P: BackupPipeline> BackupScheduler<P> {
    /// Fails with `InvalidTimezone` when `config.display_timezone` is unknown.
    /// The cron expression itself is validated by [`schedule_backups`](Self::schedule_backups).
    pub fn new(config: ScheduleConfig, registry: Arc<JobRegistry>, pipeline: Arc<P>) -> Result<Self> {
        let display_tz = display::parse_timezone(&config.display_timezone)?;
        let runner = CycleRunner {
            pipeline,
            in_flight: Arc::new(AtomicBool::new(false)),
            keep_count: config.keep_count,
        };
        Ok(Self {
            config,
            display_tz,
            registry,
            runner,
        })
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Register and arm the backup job.
    ///
    /// Returns `Ok(None)` without registering anything when backups are
    /// disabled. A malformed cron expression or timezone is returned as an
    /// error and must abort startup.
    pub async fn schedule_backups(&self) -> Result<Option<Arc<CronJob>>> {
        if !self.config.enabled {
            info!("scheduled backups disabled (BACKUP_ENABLED=false), no job registered");
            return Ok(None);
        }

        let schedule = CronSchedule::parse(&self.config.cron, &self.config.timezone)?;

        let runner = self.runner.clone();
        let callback: JobCallback = Arc::new(move || {
            let runner = runner.clone();
            async move {
                runner.run_scheduled().await;
            }
            .boxed()
        });

        let job = CronJob::new(BACKUP_JOB_NAME, schedule, callback);
        self.registry.register(Arc::clone(&job)).await;
        job.start();

        match job.next_fire_time() {
            Some(next) => info!(
                job = BACKUP_JOB_NAME,
                cron = %self.config.cron,
                timezone = %self.config.timezone,
                next_run = %display::format_utc(next),
                next_run_local = %display::format_local(next, &self.display_tz),
                "scheduled backups enabled"
            ),
            None => warn!(
                job = BACKUP_JOB_NAME,
                cron = %self.config.cron,
                "backup job armed but the schedule has no upcoming fire time"
            ),
        }

        Ok(Some(job))
    }

    /// Run one scheduled cycle (connect, create, upload, prune).
    ///
    /// This is what the timer invokes on every firing. Failures are logged
    /// and reported in the outcome, never returned as errors.
    pub async fn run_scheduled_cycle(&self) -> CycleOutcome {
        self.runner.run_scheduled().await
    }

    /// Create and upload a backup now, without pruning.
    ///
    /// Unlike scheduled runs, failures are returned to the caller. Refused
    /// with `BackupInProgress` while another cycle is running.
    pub async fn trigger_manual_backup(&self) -> Result<String> {
        let run_id = Uuid::new_v4();
        let Some(_guard) = InFlightGuard::acquire(&self.runner.in_flight) else {
            warn!(%run_id, "manual backup refused, another cycle is in flight");
            return Err(SchedulerError::BackupInProgress);
        };

        info!(%run_id, "manual backup triggered");
        let started = Instant::now();
        match self.runner.create_and_upload(run_id).await {
            Ok((artifact, upload)) => {
                let uploaded = upload == UploadStatus::Uploaded;
                info!(
                    %run_id,
                    artifact = %artifact,
                    uploaded,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "manual backup completed"
                );
                Ok(artifact)
            }
            Err(failure) => {
                error!(
                    %run_id,
                    step = %failure.step,
                    error = %format!("{:#}", failure.source),
                    "manual backup failed"
                );
                Err(failure.into())
            }
        }
    }

    /// Disarm the backup job. Best effort: a missing job is only logged.
    ///
    /// An in-flight cycle is left to finish.
    pub async fn stop_scheduled_backups(&self) {
        match self.registry.get(BACKUP_JOB_NAME) {
            Ok(job) => {
                if job.stop().await {
                    info!(job = BACKUP_JOB_NAME, "scheduled backups stopped");
                } else {
                    info!(job = BACKUP_JOB_NAME, "scheduled backups already stopped");
                }
            }
            Err(e) => warn!(error = %e, "could not stop scheduled backups"),
        }
    }

    /// Whether a scheduled or manual cycle currently holds the guard.
    pub fn is_backup_running(&self) -> bool {
        self.runner.in_flight.load(Ordering::Acquire)
    }

    /// Wait up to `grace` for an in-flight cycle to finish.
    ///
    /// Returns `true` once no cycle is running, `false` if `grace` ran out
    /// first.
    pub async fn wait_for_idle(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        while self.is_backup_running() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL.min(grace)).await;
        }
        true
    }

    pub fn get_schedule_status(&self) -> ScheduleStatus {
        self.status_at(Utc::now())
    }

    /// Status as seen at `now`. Never fails; a missing job yields the
    /// degraded record.
    pub fn status_at(&self, now: DateTime<Utc>) -> ScheduleStatus {
        let job = match self.registry.get(BACKUP_JOB_NAME) {
            Ok(job) => job,
            Err(e) => {
                debug!(error = %e, "status requested without a registered backup job");
                return ScheduleStatus::Degraded(DegradedSchedule {
                    enabled: false,
                    cron_expression: self.config.cron.clone(),
                    error: NOT_INITIALIZED.to_string(),
                });
            }
        };

        let next = job.next_fire_after(now);
        let last = job.last_fire_time();
        let tz = &self.display_tz;

        ScheduleStatus::Active(ActiveSchedule {
            enabled: self.config.enabled,
            running: job.is_active(),
            cron_expression: job.schedule().expression().to_string(),
            timezone: job.schedule().timezone().name().to_string(),
            next_run: next.map(display::format_utc),
            next_run_local: display::format_local_or_na(next, tz),
            last_run: last.map(display::format_utc),
            last_run_local: display::format_local_or_na(last, tz),
            server_time: display::format_utc(now),
            server_time_local: display::format_local(now, tz),
        })
    }
}

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A collaborator call that failed, with the step it failed in.
struct StepFailure {
    step: BackupStep,
    source: anyhow::Error,
}

impl From<StepFailure> for SchedulerError {
    fn from(failure: StepFailure) -> Self {
        SchedulerError::Collaborator {
            step: failure.step,
            source: failure.source,
        }
    }
}

fn at_step<T>(step: BackupStep, result: anyhow::Result<T>) -> std::result::Result<T, StepFailure> {
    result.map_err(|source| StepFailure { step, source })
}

/// The part of the scheduler the timer callback owns.
struct CycleRunner<P> {
    pipeline: Arc<P>,
    in_flight: Arc<AtomicBool>,
    keep_count: usize,
}

impl<P> Clone for CycleRunner<P> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            in_flight: Arc::clone(&self.in_flight),
            keep_count: self.keep_count,
        }
    }
}

impl<P: BackupPipeline> CycleRunner<P> {
    async fn run_scheduled(&self) -> CycleOutcome {
        let run_id = Uuid::new_v4();
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!(%run_id, "previous backup cycle still in flight, skipping this firing");
            return CycleOutcome::Skipped;
        };

        info!(%run_id, "scheduled backup started");
        let started = Instant::now();
        let result = async {
            let (artifact, upload) = self.create_and_upload(run_id).await?;
            at_step(
                BackupStep::Prune,
                self.pipeline.clean_old_backups(self.keep_count).await,
            )?;
            info!(%run_id, keep = self.keep_count, "old backups pruned");
            Ok::<_, StepFailure>((artifact, upload))
        }
        .await;

        match result {
            Ok((artifact, upload)) => {
                let uploaded = upload == UploadStatus::Uploaded;
                info!(
                    %run_id,
                    artifact = %artifact,
                    uploaded,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "scheduled backup completed"
                );
                CycleOutcome::Completed { artifact, uploaded }
            }
            Err(StepFailure { step, source }) => {
                let error = format!("{source:#}");
                error!(%run_id, step = %step, error = %error, "scheduled backup failed");
                CycleOutcome::Failed { step, error }
            }
        }
    }

    async fn create_and_upload(
        &self,
        run_id: Uuid,
    ) -> std::result::Result<(String, UploadStatus), StepFailure> {
        let client = at_step(BackupStep::Connect, self.pipeline.client().await)?;
        let artifact = at_step(
            BackupStep::Create,
            self.pipeline.create_full_backup(&client).await,
        )?;
        info!(%run_id, artifact = %artifact, "backup created");

        let upload = at_step(BackupStep::Upload, self.pipeline.upload(&artifact).await)?;
        match upload {
            UploadStatus::Uploaded => info!(%run_id, artifact = %artifact, "backup uploaded"),
            UploadStatus::Skipped => warn!(
                %run_id,
                artifact = %artifact,
                "upload skipped, backup exists only on this host"
            ),
        }
        Ok((artifact, upload))
    }
}

/// Holds the in-flight flag for the duration of one cycle.
///
/// Released on drop, so a panicking or cancelled cycle cannot wedge the
/// scheduler.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
