use anyhow::Result;
use chargeshare::load_sharing::LoadSharingRegistry;
use chargeshare::orchestrator::TelemetryUpdate;
use chargeshare::pricing::PriceCategory;
use chargeshare::services::{
    FixedPriceService, JsonLinesStationConnection, SharedConfigStore, StaticGridHealth,
    SystemClock,
};
use chargeshare::{ChargingOrchestrator, Config, OrchestratorServices};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Reads telemetry as JSON lines on stdin and writes station commands as
/// JSON lines on stdout.
#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    chargeshare::logging::init_logging(&config.logging)?;

    info!(
        "Chargeshare {} starting with {} charger(s) on {} power connection(s)",
        env!("APP_VERSION"),
        config.ev_charging.chargers.len(),
        config.ev_charging.power_connections.len()
    );

    let services = OrchestratorServices {
        config: Arc::new(SharedConfigStore::new(config.ev_charging.clone())),
        connection: Arc::new(JsonLinesStationConnection::new(tokio::io::stdout())),
        prices: Arc::new(FixedPriceService::new(PriceCategory::Cheap)),
        grid: Arc::new(StaticGridHealth::new(true)),
        clock: Arc::new(SystemClock::new()),
    };
    let registry = LoadSharingRegistry::with_defaults(config.load_sharing);
    let orchestrator = ChargingOrchestrator::new(services, registry, config.load_sharing);
    let (handle, worker) = orchestrator.spawn(config.queue_capacity);

    let mut snapshots = Box::pin(handle.snapshot_stream());
    let snapshot_task = tokio::spawn(async move {
        while let Some(snapshot) = snapshots.next().await {
            debug!(
                "{} on {}: {:?}, {} A allocated, signal {:?}, contactor {:?}",
                snapshot.client_id,
                snapshot.power_connection,
                snapshot.state,
                snapshot.allocated_amps,
                snapshot.pwm_percent,
                snapshot.contactor_on
            );
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match serde_json::from_str::<TelemetryUpdate>(&line) {
                        Ok(update) => {
                            if let Err(e) = handle.submit(update).await {
                                error!("Failed to queue telemetry: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Discarding malformed telemetry line: {}", e),
                    },
                    Ok(None) => {
                        info!("Telemetry input closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read telemetry: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    // Worker may already be gone; the join below reports that
    let _ = handle.shutdown().await;
    drop(handle);
    worker
        .await
        .map_err(|e| anyhow::anyhow!("Orchestrator worker failed: {}", e))?;
    snapshot_task.abort();
    info!("Shutdown complete");
    Ok(())
}
