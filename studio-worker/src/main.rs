use anyhow::Context;
use std::sync::Arc;
use studio_booking::BookingManager;
use studio_core::{spawn_forwarder, NotificationDispatcher, Notifier, SystemClock};
use studio_store::{Config, LogDispatcher};
use studio_worker::{booking_policy, start_sweep_worker};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studio_worker=debug,studio_booking=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let policy = booking_policy(&config.business_rules);
    tracing::info!(
        hold = ?policy.hold.hold_duration,
        cutoff = ?policy.cancellation.cutoff,
        "Starting studio booking worker"
    );

    let notifier = Notifier::new(config.worker.event_buffer);
    let forwarder = spawn_forwarder(&notifier, dispatcher(&config)?);

    let manager = Arc::new(BookingManager::new(policy, Arc::new(SystemClock), notifier));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = start_sweep_worker(manager.clone(), config.worker.sweep_interval(), shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    let _ = shutdown_tx.send(true);
    sweeper.await?;
    // Dropping the last manager closes the event channel and ends the forwarder
    drop(manager);
    forwarder.await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn dispatcher(config: &Config) -> anyhow::Result<Arc<dyn NotificationDispatcher>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = studio_store::KafkaDispatcher::new(&kafka.brokers, kafka.topic.clone())
                .context("Failed to create Kafka producer")?;
            tracing::info!(brokers = %kafka.brokers, topic = %kafka.topic, "Publishing events to Kafka");
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(LogDispatcher)),
    }
}

#[cfg(not(feature = "kafka"))]
fn dispatcher(config: &Config) -> anyhow::Result<Arc<dyn NotificationDispatcher>> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka is configured but this build lacks the `kafka` feature, logging events instead");
    }
    Ok(Arc::new(LogDispatcher))
}
