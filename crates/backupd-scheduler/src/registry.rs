use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::error::{Result, SchedulerError};
use crate::timer::CronJob;

/// Named cron jobs, injected into whatever owns them.
///
/// Holds at most one job per name: registering under a taken name stops and
/// evicts the previous job.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<String, Arc<CronJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `job` under its own name, returning the job it replaced.
    ///
    /// The replaced job is stopped before this returns.
    pub async fn register(&self, job: Arc<CronJob>) -> Option<Arc<CronJob>> {
        let name = job.name().to_string();
        let previous = self.jobs.insert(name.clone(), job);
        if let Some(old) = &previous {
            old.stop().await;
            info!(job = %name, "replaced previously registered job");
        } else {
            info!(job = %name, "job registered");
        }
        previous
    }

    /// Look up a job by name. Returns `JobNotFound` when absent.
    pub fn get(&self, name: &str) -> Result<Arc<CronJob>> {
        self.jobs
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SchedulerError::JobNotFound {
                name: name.to_string(),
            })
    }

    /// Stop and remove a job. Returns `JobNotFound` when absent.
    pub async fn remove(&self, name: &str) -> Result<Arc<CronJob>> {
        let (_, job) = self
            .jobs
            .remove(name)
            .ok_or_else(|| SchedulerError::JobNotFound {
                name: name.to_string(),
            })?;
        job.stop().await;
        info!(job = %name, "job removed");
        Ok(job)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
