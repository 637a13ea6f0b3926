use boutique_engine::{
    events::EventProducers,
    PackageFlowApi,
    PackageFlowConfig,
    SqliteDatabase,
};
use chrono::Duration;
use log::*;
use tokio::task::JoinHandle;

/// Starts the package sweep worker. Do not await the returned JoinHandle, as it runs indefinitely.
///
/// Each pass closes every active package whose deadline has passed (the same predicate the read path applies
/// lazily, so the two can never disagree) and flags packages entering the closing-warning horizon exactly once.
pub fn start_sweep_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    flow_config: PackageFlowConfig,
    warning_horizon: Duration,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        let api = PackageFlowApi::new(db, producers, flow_config);
        info!("🕰️ Package sweep worker started (every {interval_secs}s, warning horizon {warning_horizon})");
        loop {
            timer.tick().await;
            trace!("🕰️ Running package sweep");
            match api.sweep(warning_horizon).await {
                Ok(outcome) => {
                    if outcome.closed_count() > 0 || outcome.reminded_count() > 0 {
                        info!(
                            "🕰️ Sweep complete: {} package(s) closed, {} closing-soon warning(s) queued",
                            outcome.closed_count(),
                            outcome.reminded_count()
                        );
                        debug!("🕰️ Closed: {}", package_list(&outcome.closed));
                        debug!("🕰️ Warned: {}", package_list(&outcome.reminded));
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running package sweep: {e}");
                },
            }
        }
    })
}

fn package_list(packages: &[boutique_engine::db_types::OpenPackage]) -> String {
    packages
        .iter()
        .map(|p| format!("[{}] customer: {} closes_at: {}", p.id, p.customer_id, p.closes_at))
        .collect::<Vec<String>>()
        .join(", ")
}
