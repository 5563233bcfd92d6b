//! Event sink implementations.

use async_trait::async_trait;
use log::{debug, info};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use super::{DomainEvent, EventError, EventSink};

/// Writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn publish(&self, event: &DomainEvent) -> Result<(), EventError> {
        let payload =
            serde_json::to_string(event).map_err(|e| EventError::Rejected(e.to_string()))?;
        info!("event {}: {}", event.kind(), payload);
        Ok(())
    }
}

/// Fans events out to in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastSink {
    /// Create a channel buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn publish(&self, event: &DomainEvent) -> Result<(), EventError> {
        // Having no subscribers is not a delivery failure
        if self.sender.send(event.clone()).is_err() {
            debug!("No subscribers for {} event", event.kind());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recording {
    events: Vec<DomainEvent>,
    attempts: usize,
    failures_left: usize,
}

/// Keeps published events in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` publish calls
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failures_left = count;
        }
    }

    /// Events delivered so far
    pub fn events(&self) -> Vec<DomainEvent> {
        self.inner
            .lock()
            .map(|inner| inner.events.clone())
            .unwrap_or_default()
    }

    /// Publish calls made so far, failed ones included
    pub fn attempts(&self) -> usize {
        self.inner.lock().map(|inner| inner.attempts).unwrap_or(0)
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: &DomainEvent) -> Result<(), EventError> {
        let mut inner = self.inner.lock().map_err(|_| EventError::Closed)?;
        inner.attempts += 1;
        if inner.failures_left > 0 {
            inner.failures_left -= 1;
            return Err(EventError::Rejected("injected failure".to_string()));
        }
        inner.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> DomainEvent {
        DomainEvent::BattleCancelled {
            battle_id: 1,
            tournament_id: 1,
            round: 1,
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();

        sink.publish(&event()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), event());
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let sink = BroadcastSink::new(8);
        assert!(sink.publish(&event()).await.is_ok());
    }

    #[tokio::test]
    async fn test_log_sink_accepts_events() {
        assert!(LogSink.publish(&event()).await.is_ok());
    }
}
