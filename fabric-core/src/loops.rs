//! Background loops: the Scheduler Loop (periodic ready-set re-evaluation,
//! defence-in-depth on top of the event-driven triggers in `task_result`
//! and `submit_dag`) and the Reaper Loop (evicts workers whose heartbeat
//! has aged out and re-queues their in-flight tasks).

use crate::state::State;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub async fn scheduler_loop(state: Arc<State>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state.reevaluate_all_dags().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("scheduler loop exiting");
                    break;
                }
            }
        }
    }
}

pub async fn reaper_loop(
    state: Arc<State>,
    period: Duration,
    heartbeat_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reclaimed = state.reap(heartbeat_timeout.as_secs()).await;
                if !reclaimed.is_empty() {
                    tracing::info!(count = reclaimed.len(), "reclaimed in-flight tasks from dead workers");
                    state.reevaluate_all_dags().await;
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("reaper loop exiting");
                    break;
                }
            }
        }
    }
}
