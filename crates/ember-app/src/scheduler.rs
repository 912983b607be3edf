//! Cancellable fixed-interval background loops.
//!
//! A [`PeriodicTask`] drives one [`PeriodicJob`]. The loop never overlaps
//! with itself: a tick that fires while a run is in flight is skipped, and
//! `stop` waits for the in-flight run before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    /// One pass. Failures are the job's to log; the loop keeps going.
    async fn run(&self);
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct PeriodicTask {
    job: Arc<dyn PeriodicJob>,
    interval: Duration,
    running: Mutex<Option<Running>>,
    busy: Arc<AtomicBool>,
    last_run: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl PeriodicTask {
    pub fn new(job: Arc<dyn PeriodicJob>, interval: Duration) -> Self {
        Self {
            job,
            interval: interval.max(Duration::from_millis(1)),
            running: Mutex::new(None),
            busy: Arc::new(AtomicBool::new(false)),
            last_run: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawns the loop. Returns false if it was already running.
    pub fn start(&self) -> bool {
        let Ok(mut running) = self.running.lock() else {
            return false;
        };
        if running.is_some() {
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let job = Arc::clone(&self.job);
        let busy = Arc::clone(&self.busy);
        let last_run = Arc::clone(&self.last_run);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; runs start one interval in.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        guarded_run(job.as_ref(), &busy, &last_run).await;
                    }
                }
            }
            tracing::debug!(job = job.name(), "periodic task stopped");
        });

        tracing::info!(job = self.job.name(), interval_ms = interval.as_millis() as u64, "periodic task started");
        *running = Some(Running { shutdown, handle });
        true
    }

    /// Stops the loop after any in-flight run. Returns false if it was not running.
    pub async fn stop(&self) -> bool {
        let running = match self.running.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(running) = running else {
            return false;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            tracing::warn!(job = self.job.name(), error = %e, "periodic task ended abnormally");
        }
        true
    }

    /// Runs the job now unless a run is already in flight.
    pub async fn run_once(&self) -> bool {
        guarded_run(self.job.as_ref(), &self.busy, &self.last_run).await
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| r.is_some()).unwrap_or(false)
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run.lock().ok().and_then(|r| *r)
    }
}

async fn guarded_run(
    job: &dyn PeriodicJob,
    busy: &AtomicBool,
    last_run: &Mutex<Option<DateTime<Utc>>>,
) -> bool {
    if busy
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        tracing::debug!(job = job.name(), "previous run still in flight, skipping tick");
        return false;
    }
    job.run().await;
    if let Ok(mut last) = last_run.lock() {
        *last = Some(Utc::now());
    }
    busy.store(false, Ordering::Release);
    true
}
