//! Periodic background work: resolving finished challenges, cleaning up
//! abandoned ones and sending deadline notifications.
//!
//! Every job exposes a `run_once(state, now)` that does one pass; the loops
//! spawned here only supply the clock.

pub mod cleanup;
pub mod notifications;
pub mod results;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::state::AppState;

/// Spawn every job loop. Each tick's errors are logged and the loop keeps going.
pub fn spawn_jobs(state: &AppState) {
    let jobs = &state.config.jobs;

    spawn_every(
        "result_submission",
        jobs.result_submission_interval_secs,
        state.clone(),
        |state, now| async move { results::run_once(&state, now).await.map(drop) },
    );
    spawn_every(
        "cleanup",
        jobs.cleanup_interval_secs,
        state.clone(),
        |state, now| async move { cleanup::run_once(&state, now).await.map(drop) },
    );
    spawn_every(
        "notifications",
        jobs.notification_interval_secs,
        state.clone(),
        |state, now| async move { notifications::run_once(&state, now).await.map(drop) },
    );
}

fn spawn_every<F, Fut>(name: &'static str, every_secs: u64, state: AppState, tick: F)
where
    F: Fn(AppState, DateTime<Utc>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    let period = Duration::from_secs(every_secs.max(1));
    info!(job = name, interval_secs = period.as_secs(), "Starting background job");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            if let Err(e) = tick(state.clone(), Utc::now()).await {
                error!(job = name, error = %e, "Background job failed");
            }
        }
    });
}
