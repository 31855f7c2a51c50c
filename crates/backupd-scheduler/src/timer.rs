//! `CronJob`: a named periodic timer driven by a [`CronSchedule`].
//!
//! The timer runs as its own Tokio task. Each firing spawns the callback as a
//! separate task, so a slow callback never delays the next fire time; callers
//! that must not overlap guard inside the callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::schedule::CronSchedule;

/// Work executed on every firing.
pub type JobCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Counters shared between the job handle and its timer task.
#[derive(Default)]
struct FireStats {
    count: AtomicU64,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl FireStats {
    fn record(&self, at: DateTime<Utc>) -> u64 {
        *lock(&self.last) = Some(at);
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Handle to a running timer task.
struct Armed {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct CronJob {
    name: String,
    schedule: CronSchedule,
    callback: JobCallback,
    stats: Arc<FireStats>,
    armed: Mutex<Option<Armed>>,
}

impl CronJob {
    /// Create a stopped job. Nothing fires until [`start`](Self::start).
    pub fn new(name: impl Into<String>, schedule: CronSchedule, callback: JobCallback) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            schedule,
            callback,
            stats: Arc::new(FireStats::default()),
            armed: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    /// Arm the timer on the current Tokio runtime.
    ///
    /// The first firing happens at the next scheduled time, never
    /// immediately. Returns `false` if the timer was already armed.
    /// Dropping the job disarms it.
    pub fn start(&self) -> bool {
        let mut armed = lock(&self.armed);
        if armed.as_ref().is_some_and(|a| !a.task.is_finished()) {
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_timer(
            self.name.clone(),
            self.schedule.clone(),
            Arc::clone(&self.callback),
            Arc::clone(&self.stats),
            shutdown_rx,
        ));
        *armed = Some(Armed { shutdown_tx, task });

        info!(job = %self.name, cron = %self.schedule.expression(), "cron job armed");
        true
    }

    /// Disarm the timer and wait for its task to exit.
    ///
    /// A callback that is already running is not interrupted. Returns
    /// `false` when the job was not armed.
    pub async fn stop(&self) -> bool {
        let armed = lock(&self.armed).take();
        let Some(Armed { shutdown_tx, task }) = armed else {
            debug!(job = %self.name, "stop requested but job is not armed");
            return false;
        };

        let _ = shutdown_tx.send(true);
        if let Err(e) = task.await {
            warn!(job = %self.name, "timer task ended abnormally: {e}");
        }
        info!(job = %self.name, "cron job stopped");
        true
    }

    pub fn is_active(&self) -> bool {
        lock(&self.armed)
            .as_ref()
            .is_some_and(|a| !a.task.is_finished())
    }

    /// Next time the timer will fire, or `None` while stopped.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.next_fire_after(Utc::now())
    }

    /// First fire time strictly after `from`, or `None` while stopped.
    pub fn next_fire_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_active() {
            return None;
        }
        self.schedule.next_after(from)
    }

    /// When the timer last fired, if ever.
    pub fn last_fire_time(&self) -> Option<DateTime<Utc>> {
        *lock(&self.stats.last)
    }

    pub fn fire_count(&self) -> u64 {
        self.stats.count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CronJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronJob")
            .field("name", &self.name)
            .field("schedule", &self.schedule.expression())
            .field("timezone", &self.schedule.timezone())
            .field("active", &self.is_active())
            .field("fire_count", &self.fire_count())
            .finish()
    }
}

/// Timer loop. Exits when `shutdown` flips to `true` or its sender is dropped.
async fn run_timer(
    name: String,
    schedule: CronSchedule,
    callback: JobCallback,
    stats: Arc<FireStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut cursor = Utc::now();
    loop {
        let Some(next) = schedule.next_after(cursor) else {
            warn!(job = %name, "schedule has no upcoming fire time; timer exiting");
            break;
        };
        if next <= cursor {
            warn!(job = %name, next = %next, cursor = %cursor, "schedule went backwards; timer exiting");
            break;
        }
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(job = %name, next = %next, wait_secs = wait.as_secs(), "timer waiting");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        // Slots missed while the process was suspended are skipped, not replayed.
        cursor = next.max(Utc::now());
        let fired = stats.record(Utc::now());
        debug!(job = %name, fire = fired, "cron job fired");
        tokio::spawn(callback());
    }
    debug!(job = %name, "timer loop exited");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
