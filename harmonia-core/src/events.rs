//! Event bus: fan-out of media and player events to subscribers.
//!
//! Built on a broadcast channel: publishing never blocks, delivery is FIFO
//! per subscriber and handlers run on the subscriber's own task so a slow
//! consumer cannot re-enter the publisher.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MediaItemAdded,
    MediaItemUpdated,
    MediaItemDeleted,
    PlayerAdded,
    PlayerRemoved,
    PlayerChanged,
    PlayerControlRegistered,
    PlayerControlUpdated,
    MusicSyncStatus,
    QueueUpdated,
    StreamStarted,
    StreamEnded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    /// Uri or id of the object this event is about, if any.
    pub object_id: Option<String>,
    /// Canonical JSON form of the payload entity.
    pub data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Events published with no subscribers are dropped silently.
    pub fn publish(&self, event_type: EventType, object_id: Option<String>, data: serde_json::Value) {
        let _ = self.sender.send(Event {
            event_type,
            object_id,
            data,
        });
    }

    /// Publish with a serializable payload.
    pub fn publish_obj<T: Serialize>(
        &self,
        event_type: EventType,
        object_id: Option<String>,
        payload: &T,
    ) {
        match serde_json::to_value(payload) {
            Ok(data) => self.publish(event_type, object_id, data),
            Err(err) => {
                tracing::warn!(?event_type, %err, "failed to serialize event payload");
            }
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_delivery() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(EventType::MediaItemAdded, Some("track://a/1".into()), serde_json::json!(1));
        bus.publish(EventType::MediaItemUpdated, Some("track://a/1".into()), serde_json::json!(2));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.event_type, EventType::MediaItemAdded);
        assert_eq!(second.event_type, EventType::MediaItemUpdated);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(EventType::PlayerChanged, None, serde_json::Value::Null);
    }
}
