use crate::gateway::protocol::GatewayEvent;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 256;

/// Fan-out of task lifecycle events to websocket observers. Sending never
/// blocks the dispatcher; slow observers miss events instead.
pub struct EventBroadcaster {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    pub fn broadcast(&self, event: GatewayEvent) {
        log::debug!("[EVENTS] {} {}", event.event, event.data);
        // No observers connected
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
