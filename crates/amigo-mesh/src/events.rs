//! The embedder-facing event bus.
//!
//! The presentation layer observes the mesh through these events rather
//! than polling the store. Delivery is best-effort: a slow subscriber
//! loses the oldest events, never blocks the dispatcher.

use amigo_types::ChatMessage;
use tokio::sync::broadcast;

/// An event emitted by the mesh core.
#[derive(Clone, Debug)]
pub enum MeshEvent {
    /// A message was decrypted and stored.
    MessageReceived(ChatMessage),
    /// A delivery ack retired an outbox row.
    MessageDelivered { message_id: String },
    /// A welcome admitted this device to a group.
    GroupJoined { group_id: String },
    /// A path update advanced a group's epoch.
    EpochAdvanced { group_id: String, epoch: u64 },
    /// A radio peer connected.
    PeerConnected { device_uuid: String },
    /// A radio peer disconnected.
    PeerDisconnected { device_uuid: String },
}

/// Broadcast bus for [`MeshEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MeshEvent>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Lossy when nobody listens.
    pub fn emit(&self, event: MeshEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        bus.emit(MeshEvent::MessageDelivered {
            message_id: "m1".to_string(),
        });

        match receiver.recv().await.expect("receive") {
            MeshEvent::MessageDelivered { message_id } => assert_eq!(message_id, "m1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        bus.emit(MeshEvent::PeerConnected {
            device_uuid: "dev".to_string(),
        });
    }
}
