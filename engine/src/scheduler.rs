//! Job scheduler: arms and disarms per-job tickers and notifies a
//! caller-supplied callback each time a job's trigger fires.
//!
//! Each armed job gets its own spawned tokio task that sleeps until the
//! next fire time, with an in-flight guard against overlapping firings.
//! Jobs live in a dynamic map keyed by job id, since tasks and task groups
//! can be armed and disarmed at any time through the control API, and a
//! trigger can be interval, cron, or one-shot.

use chrono::Utc;
use scheduler_core::{SchedulerError, Trigger};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type FireCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct JobHandle {
    trigger: Trigger,
    ticker: tokio::task::JoinHandle<()>,
}

/// Owns the set of currently-armed jobs. One `Scheduler` is shared across
/// the control API and serves both tasks and task groups, keyed by a single
/// job id namespace the caller is responsible for keeping unique.
#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<HashMap<String, JobHandle>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `job_id` against `trigger`, invoking `on_fire` every time it
    /// comes due. Fails with `Conflict` if the job is already armed -
    /// callers must `disarm` first to rearm with a new trigger.
    pub async fn arm<F, Fut>(
        &self,
        job_id: impl Into<String>,
        trigger: Trigger,
        on_fire: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job_id = job_id.into();
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job_id) {
            return Err(SchedulerError::Conflict(format!(
                "job '{job_id}' is already armed"
            )));
        }

        let in_flight = Arc::new(AtomicBool::new(false));
        let callback: FireCallback = Arc::new(move || Box::pin(on_fire()));
        let ticker = spawn_ticker(job_id.clone(), trigger.clone(), in_flight, callback);

        jobs.insert(job_id, JobHandle { trigger, ticker });
        Ok(())
    }

    /// Disarms `job_id`, aborting its ticker. A no-op if the job isn't
    /// armed - callers need not check `inspect` first.
    pub async fn disarm(&self, job_id: &str) {
        if let Some(handle) = self.jobs.lock().await.remove(job_id) {
            handle.ticker.abort();
        }
    }

    /// Reports when `job_id` will next fire, or `None` if it isn't armed or
    /// its trigger has no more fires left (an exhausted one-shot or a
    /// window past its `end_time`).
    pub async fn inspect(&self, job_id: &str) -> Option<chrono::DateTime<Utc>> {
        let jobs = self.jobs.lock().await;
        jobs.get(job_id)?.trigger.next_fire_after(Utc::now())
    }

    pub async fn is_armed(&self, job_id: &str) -> bool {
        self.jobs.lock().await.contains_key(job_id)
    }
}

fn spawn_ticker(
    job_id: String,
    trigger: Trigger,
    in_flight: Arc<AtomicBool>,
    on_fire: FireCallback,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(next) = trigger.next_fire_after(Utc::now()) else {
                debug!("job '{job_id}' has no further fires; ticker exiting");
                break;
            };
            let delay = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;

            if in_flight.swap(true, Ordering::SeqCst) {
                warn!("job '{job_id}' overrun: previous firing still in flight, skipping tick");
                continue;
            }

            let callback = on_fire.clone();
            let flag = in_flight.clone();
            tokio::spawn(async move {
                callback().await;
                flag.store(false, Ordering::SeqCst);
            });
        }
    })
}
