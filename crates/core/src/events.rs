//! Batch completion events.
//!
//! The executor reports completion through an injected [`EventSink`] rather than an ambient bus.
//! Publishing is fire-and-forget: a failed publish is logged by the executor and never affects
//! the batch result.

use crate::constants::{BATCH_COMPLETED_EVENT, DEFAULT_EVENT_CHANNEL_CAPACITY};
use crate::history::HistoryEntry;
use crate::SyncResult;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ResultCounts {
    pub success: usize,
    pub failed: usize,
}

/// Payload published when a batch completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchEvent {
    pub name: &'static str,
    pub operation: HistoryEntry,
    pub results: ResultCounts,
}

impl BatchEvent {
    pub fn completed(entry: HistoryEntry) -> Self {
        let results = ResultCounts {
            success: entry.success_count,
            failed: entry.failed_count,
        };
        Self {
            name: BATCH_COMPLETED_EVENT,
            operation: entry,
            results,
        }
    }
}

/// Destination for batch events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: BatchEvent) -> SyncResult<()>;
}

/// In-process sink based on a tokio broadcast channel.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<BatchEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn publish(&self, event: BatchEvent) -> SyncResult<()> {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
        Ok(())
    }
}

/// Sink that writes events to the `tracing` log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: BatchEvent) -> SyncResult<()> {
        tracing::info!(
            event = event.name,
            operation = %event.operation.operation_type,
            kind = %event.operation.resource_kind,
            success = event.results.success,
            failed = event.results.failed,
            actor = %event.operation.actor,
            "batch event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::OperationType;
    use chrono::Utc;
    use clinsync_types::ResourceKind;
    use uuid::Uuid;

    fn entry() -> HistoryEntry {
        HistoryEntry {
            operation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation_type: OperationType::Deactivate,
            resource_kind: ResourceKind::Task,
            total_count: 3,
            success_count: 2,
            failed_count: 1,
            duration_ms: 40,
            actor: "Dr Yusuf".into(),
        }
    }

    #[tokio::test]
    async fn broadcast_sink_delivers_event() {
        let sink = BroadcastEventSink::new(4);
        let mut rx = sink.subscribe();
        sink.publish(BatchEvent::completed(entry()))
            .await
            .expect("publish");
        let event = rx.recv().await.expect("event");
        assert_eq!(event.name, "batch-operation-completed");
        assert_eq!(event.results, ResultCounts { success: 2, failed: 1 });
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let sink = BroadcastEventSink::default();
        assert!(sink.publish(BatchEvent::completed(entry())).await.is_ok());
        assert!(LogEventSink.publish(BatchEvent::completed(entry())).await.is_ok());
    }

    #[test]
    fn event_payload_shape() {
        let value = serde_json::to_value(BatchEvent::completed(entry())).expect("serialise");
        assert_eq!(value["results"]["success"], 2);
        assert_eq!(value["operation"]["failedCount"], 1);
    }
}
