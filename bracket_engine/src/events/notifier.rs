//! Event dispatch with transaction-scoped buffering.

use log::{debug, error, warn};
use std::sync::Arc;

use super::{DomainEvent, EventSink, LogSink};

/// Events raised inside a transaction, waiting for the commit
///
/// Dropping a scope discards its events.
#[derive(Debug, Default)]
#[must_use = "a scope must be flushed after commit or its events are lost"]
pub struct EventScope {
    events: Vec<DomainEvent>,
}

impl EventScope {
    /// Buffer an event
    pub fn push(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Buffered events in the order they were raised
    pub fn events(&self) -> &[DomainEvent] {
        &self.events
    }
}

/// Dispatches domain events to a sink
///
/// Delivery is best-effort: a failed publish is retried once, then logged
/// and dropped. Callers never see a dispatch error.
#[derive(Clone)]
pub struct EventNotifier {
    sink: Arc<dyn EventSink>,
}

impl EventNotifier {
    /// Create a notifier over a sink
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Open a new buffering scope
    pub fn scope(&self) -> EventScope {
        EventScope::default()
    }

    /// Dispatch an event immediately
    pub async fn emit(&self, event: DomainEvent) {
        self.dispatch(&event).await;
    }

    /// Dispatch everything a committed scope buffered
    pub async fn flush(&self, scope: EventScope) {
        if !scope.is_empty() {
            debug!("Flushing {} buffered events", scope.len());
        }
        for event in scope.events {
            self.dispatch(&event).await;
        }
    }

    /// Deliver one event, retrying once
    async fn dispatch(&self, event: &DomainEvent) -> bool {
        match self.sink.publish(event).await {
            Ok(()) => true,
            Err(first) => {
                warn!("Publishing {} failed, retrying: {}", event.kind(), first);
                match self.sink.publish(event).await {
                    Ok(()) => true,
                    Err(second) => {
                        error!(
                            "Dropping {} event for tournament {}: {}",
                            event.kind(),
                            event.tournament_id(),
                            second
                        );
                        false
                    }
                }
            }
        }
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;

    fn cancelled(battle_id: i64) -> DomainEvent {
        DomainEvent::BattleCancelled {
            battle_id,
            tournament_id: 1,
            round: 1,
        }
    }

    #[tokio::test]
    async fn test_scope_events_flush_in_order() {
        let sink = RecordingSink::new();
        let notifier = EventNotifier::new(Arc::new(sink.clone()));

        let mut scope = notifier.scope();
        scope.push(cancelled(1));
        scope.push(cancelled(2));
        assert!(sink.events().is_empty());

        notifier.flush(scope).await;
        assert_eq!(sink.events(), vec![cancelled(1), cancelled(2)]);
    }

    #[tokio::test]
    async fn test_dropped_scope_publishes_nothing() {
        let sink = RecordingSink::new();
        let notifier = EventNotifier::new(Arc::new(sink.clone()));

        let mut scope = notifier.scope();
        scope.push(cancelled(1));
        drop(scope);

        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_single_failure_is_retried() {
        let sink = RecordingSink::new();
        sink.fail_next(1);
        let notifier = EventNotifier::new(Arc::new(sink.clone()));

        notifier.emit(cancelled(5)).await;
        assert_eq!(sink.events(), vec![cancelled(5)]);
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test]
    async fn test_second_failure_is_swallowed() {
        let sink = RecordingSink::new();
        sink.fail_next(2);
        let notifier = EventNotifier::new(Arc::new(sink.clone()));

        notifier.emit(cancelled(5)).await;
        assert!(sink.events().is_empty());
        assert_eq!(sink.attempts(), 2);

        // Later events are unaffected
        notifier.emit(cancelled(6)).await;
        assert_eq!(sink.events(), vec![cancelled(6)]);
    }
}
