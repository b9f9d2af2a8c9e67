//! Periodic background jobs. Both run on the registry's task tracker and stop when
//! the registry's job cancellation fires.

use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::registry::TokenRegistry;

/// Snapshots the store every `backup_interval`; the first snapshot comes one period after start.
pub fn spawn_backup_job(registry: TokenRegistry) {
    let period = registry.settings().backup_interval;
    spawn_periodic(registry, "backup", period, period, |registry| async move {
        if registry.force_backup(None).await {
            debug!("periodic token backup written");
        }
    });
}

/// Sweeps inactive visitors every `cleanup_interval`, starting immediately.
pub fn spawn_cleanup_job(registry: TokenRegistry) {
    let period = registry.settings().cleanup_interval;
    let threshold = registry.settings().inactivity_threshold;
    spawn_periodic(registry, "cleanup", Duration::ZERO, period, move |registry| async move {
        registry.cleanup_inactive_visitors(threshold);
    });
}

fn spawn_periodic<F, Fut>(registry: TokenRegistry, name: &'static str, delay: Duration, period: Duration, job: F)
where
    F: Fn(TokenRegistry) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    // the ticker adds `period` to its deadline, so both must stay representable
    let Some(start) = Instant::now().checked_add(delay).filter(|start| start.checked_add(period).is_some()) else {
        warn!(job = name, period_secs = period.as_secs(), "period out of range, periodic job not started");
        return;
    };
    let cancel = registry.jobs_cancellation().clone();
    info!(job = name, period_secs = period.as_secs(), "periodic job started");

    let task_registry = registry.clone();
    registry.spawn(async move {
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(job = name, "periodic job stopped");
                    break;
                }
                _ = ticker.tick() => job(task_registry.clone()).await,
            }
        }
    });
}
