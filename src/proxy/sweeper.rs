use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::service::LookupService;

/// Periodically reclaim expired cache entries and idle rate-limit subjects,
/// independent of request traffic. Abort the handle to stop it.
pub fn spawn_sweeper(service: Arc<LookupService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = service.sweep();
            if report.cache_entries_removed > 0 || report.rate_subjects_removed > 0 {
                let stats = service.cache_stats();
                tracing::info!(
                    "Sweep removed {} cache entries and {} rate-limit subjects ({} cached, {} hits / {} misses)",
                    report.cache_entries_removed,
                    report.rate_subjects_removed,
                    service.cache_len(),
                    stats.hits,
                    stats.misses
                );
            } else {
                tracing::debug!("Sweep found nothing to reclaim");
            }
        }
    })
}
