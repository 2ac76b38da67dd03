use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info};

use crate::orchestrator::service::Orchestrator;

/// Periodically errors assessments stuck in `analyzing` or `evaluating`.
pub fn spawn_sweeper(orchestrator: Arc<Orchestrator>) -> JoinHandle<()> {
    let period = orchestrator.config().sweep_interval;
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match orchestrator.sweep_stalled(Utc::now()).await {
                Ok(0) => {}
                Ok(swept) => info!("Sweep errored {swept} stalled assessments"),
                Err(e) => error!("Sweep failed: {e}"),
            }
        }
    })
}
