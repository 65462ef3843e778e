use pendulum_simulator::{EngineConfig, SimulationHandle};
use shared_types::SimulationEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pendulum_simulator=info".into());
    let json = std::env::var("PENDULUM_LOG_FORMAT").is_ok_and(|format| format == "json");
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let config = EngineConfig::from_env()?;
    info!(
        pendulums = config.pool_size(),
        tick_interval_us = config.tick_interval.as_micros() as u64,
        restart_timeout_ms = config.restart_timeout.as_millis() as u64,
        "pendulum simulator starting"
    );

    let options = config.initial_options.clone();
    let handle = SimulationHandle::spawn(config).await?;

    let mut events = handle.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SimulationEvent::Collision { pair, time }) => {
                    info!(?pair, time, "collision");
                }
                Ok(SimulationEvent::Error { message }) => {
                    warn!(%message, "simulation error");
                }
                Ok(SimulationEvent::Options { options }) => {
                    info!(pendulums = options.len(), wind = options.wind.enabled, "options applied");
                }
                Ok(SimulationEvent::State { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let snapshot = handle.start(options).await?;
    info!(status = ?snapshot.status, "simulation started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    if let Err(e) = handle.stop().await {
        warn!(error = %e, "stop failed");
    }
    handle.shutdown().await?;
    logger.abort();
    Ok(())
}
