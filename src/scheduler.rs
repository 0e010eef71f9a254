use crate::error::Result;
use chrono::{Local, NaiveTime};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs periodic jobs against wall-clock time.
///
/// Two job classes: fixed-interval and fixed-time-of-day. Each job is
/// at-most-one-in-flight: a tick that arrives while the previous run is
/// still live is skipped, never queued. A failing run is logged and does not
/// cancel future runs.
pub struct Scheduler {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            handles: Vec::new(),
        }
    }

    /// Run `job` every `period`, starting one period from now.
    pub fn every<F, Fut>(&mut self, name: &'static str, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            let in_flight = Arc::new(AtomicBool::new(false));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick completes immediately; consume it so
            // the job first runs one period after startup.
            ticker.tick().await;

            info!(job = name, period_secs = period.as_secs_f64(), "interval job scheduled");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                run_guarded(name, &in_flight, job());
            }
        });
        self.handles.push(handle);
    }

    /// Run `job` once per day at local wall-clock time `at`.
    pub fn daily<F, Fut>(&mut self, name: &'static str, at: NaiveTime, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            let in_flight = Arc::new(AtomicBool::new(false));
            info!(job = name, at = %at, "daily job scheduled");
            loop {
                let wait = until_next_occurrence(at);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                run_guarded(name, &in_flight, job());
            }
        });
        self.handles.push(handle);
    }

    /// Wait for every job loop to wind down after the token is cancelled.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Spawn one job run unless the previous run is still in flight, in which
/// case the tick is dropped.
fn run_guarded<Fut>(name: &'static str, in_flight: &Arc<AtomicBool>, fut: Fut)
where
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    if in_flight.swap(true, Ordering::SeqCst) {
        warn!(job = name, "previous run still in flight; skipping tick");
        return;
    }
    let flag = Arc::clone(in_flight);
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            error!(job = name, "scheduled job failed: {e}");
        }
        flag.store(false, Ordering::SeqCst);
    });
}

/// Duration from now until the next local occurrence of `at`; compares
/// against the wall clock each cycle, so drift never accumulates.
fn until_next_occurrence(at: NaiveTime) -> Duration {
    let now = Local::now().naive_local();
    let mut next = now.date().and_time(at);
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}
