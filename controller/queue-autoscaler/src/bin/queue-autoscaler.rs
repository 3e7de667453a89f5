//! Queue Autoscaler binary - reconciles scaling rules until interrupted

use queue_autoscaler::{
    Cancellation, Config, DryRunWorkloadStore, Driver, HttpWorkloadStore, JszClient,
    MemoryRuleStore, Reconciler, WorkloadStore,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse_config();

    // Initialize logging
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }

    info!("Starting Queue Autoscaler");
    info!("Configuration:");
    info!("  Rules manifest: {}", config.rules_path);
    info!("  Scale endpoint: {}", config.scale_endpoint);
    info!("  Dry-run: {}", config.dry_run);
    info!("  Cooldown: {}s", config.cooldown_secs);
    info!(
        "  Requeue (short/long): {}s/{}s",
        config.short_requeue_secs, config.long_requeue_secs
    );

    let rules = Arc::new(MemoryRuleStore::from_manifest(&config.rules_path)?);
    if rules.is_empty() {
        warn!("Rules manifest contains no scaling rules");
    }

    let backlog = Arc::new(JszClient::new(config.request_timeout())?);

    let http_store =
        HttpWorkloadStore::new(config.scale_endpoint.clone(), config.request_timeout())?;
    let workloads: Arc<dyn WorkloadStore> = if config.dry_run {
        info!("Using dry-run workload store, replicas will not be written");
        Arc::new(DryRunWorkloadStore::new(http_store))
    } else {
        Arc::new(http_store)
    };

    let reconciler = Arc::new(Reconciler::new(
        rules.clone(),
        workloads,
        backlog,
        config.reconciler_config(),
    ));
    let driver = Driver::new(reconciler, rules);

    let (handle, cancel) = Cancellation::new();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        }
        handle.cancel();
    });

    match driver.run(cancel).await {
        Ok(()) => {
            info!("Queue autoscaler exited normally");
            Ok(())
        }
        Err(e) => {
            error!("Queue autoscaler failed: {}", e);
            Err(e)
        }
    }
}
