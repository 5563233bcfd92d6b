//! Relay of engine events to the server log and metrics.

use bracket_engine::DomainEvent;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tokio::task::JoinHandle;

use crate::metrics;

/// Consume broadcast events until every sender is gone
pub fn spawn_event_relay(mut receiver: Receiver<DomainEvent>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut relayed = 0;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    relayed += 1;
                    metrics::domain_events_total(event.kind());
                    match serde_json::to_string(&event) {
                        Ok(json) => tracing::info!(
                            tournament_id = event.tournament_id(),
                            event_type = event.kind(),
                            "Event: {}",
                            json
                        ),
                        Err(e) => {
                            tracing::warn!("Could not serialize {} event: {}", event.kind(), e)
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event relay lagged, {} event(s) dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        relayed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bracket_engine::EventSink;
    use bracket_engine::events::BroadcastSink;

    #[tokio::test]
    async fn test_relay_drains_until_closed() {
        let sink = BroadcastSink::new(16);
        let handle = spawn_event_relay(sink.subscribe());

        sink.publish(&DomainEvent::BattleCancelled {
            battle_id: 3,
            tournament_id: 1,
            round: 1,
        })
        .await
        .unwrap();
        drop(sink);

        assert_eq!(handle.await.unwrap(), 1);
    }
}
