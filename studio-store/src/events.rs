use async_trait::async_trait;
use studio_core::NotificationDispatcher;
use studio_shared::BookingEvent;
use tracing::info;

#[cfg(feature = "kafka")]
pub use kafka::KafkaDispatcher;

/// Writes every event to the log as JSON. Used when no broker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(
        &self,
        event: &BookingEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(event)?;
        info!(event = event.name(), session_id = %event.session_id(), "{}", payload);
        Ok(())
    }
}

#[cfg(feature = "kafka")]
mod kafka {
    use super::*;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use std::time::Duration;
    use tracing::error;

    /// Publishes events to a Kafka topic keyed by session id, so each
    /// session's events stay ordered within a partition.
    #[derive(Clone)]
    pub struct KafkaDispatcher {
        producer: FutureProducer,
        topic: String,
    }

    impl KafkaDispatcher {
        pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self, rdkafka::error::KafkaError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()?;

            Ok(Self {
                producer,
                topic: topic.into(),
            })
        }

        pub async fn publish(&self, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
            let record = FutureRecord::to(&self.topic).key(key).payload(payload);

            match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                Ok(delivery) => {
                    info!(
                        "Sent message to {}/{}: partition {} offset {}",
                        self.topic, key, delivery.partition, delivery.offset
                    );
                    Ok(())
                }
                Err((e, _msg)) => {
                    error!("Failed to send message to {}: {}", self.topic, e);
                    Err(e)
                }
            }
        }
    }

    #[async_trait]
    impl NotificationDispatcher for KafkaDispatcher {
        async fn dispatch(
            &self,
            event: &BookingEvent,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let payload = serde_json::to_string(event)?;
            self.publish(&event.session_id().to_string(), &payload).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_log_dispatcher_accepts_every_event() {
        let event = BookingEvent::SessionCancelled {
            session_id: Uuid::new_v4(),
            affected_bookings: 3,
            timestamp: Utc::now(),
        };
        assert!(LogDispatcher.dispatch(&event).await.is_ok());
    }
}
