use async_trait::async_trait;
use std::sync::Arc;
use studio_shared::BookingEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Delivers booking events to an external collaborator (mailer, SMS, bus).
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        event: &BookingEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Fire-and-forget event fan-out used by the engine after each committed
/// transition.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<BookingEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Never blocks. Having no subscribers is not an error.
    pub fn emit(&self, event: BookingEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Forward every emitted event to `dispatcher` on a dedicated task.
pub fn spawn_forwarder(
    notifier: &Notifier,
    dispatcher: Arc<dyn NotificationDispatcher>,
) -> JoinHandle<()> {
    let mut rx = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = dispatcher.dispatch(&event).await {
                        error!(event = event.name(), "Failed to dispatch notification: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification forwarder lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Notification channel closed, forwarder stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl NotificationDispatcher for Recording {
        async fn dispatch(
            &self,
            event: &BookingEvent,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.seen.lock().push(event.name());
            Ok(())
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let notifier = Notifier::new(4);
        notifier.emit(BookingEvent::SessionCancelled {
            session_id: Uuid::new_v4(),
            affected_bookings: 0,
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_forwarder_delivers_events() {
        let notifier = Notifier::new(4);
        let recording = Arc::new(Recording::default());
        let handle = spawn_forwarder(&notifier, recording.clone());

        notifier.emit(BookingEvent::SessionCancelled {
            session_id: Uuid::new_v4(),
            affected_bookings: 2,
            timestamp: Utc::now(),
        });
        drop(notifier);
        handle.await.unwrap();

        assert_eq!(*recording.seen.lock(), vec!["session.cancelled"]);
    }
}
