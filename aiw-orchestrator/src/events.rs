//! In-process notifications about workspace changes.

use crate::chat::ChatExchange;
use crate::workspace::WorkspaceRecord;
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Where a chat dispatch came from, so a socket can skip its own echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatOrigin {
    #[default]
    Http,
    Socket(u64),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkspaceEvent {
    StateChanged {
        workspace: WorkspaceRecord,
    },
    Chat {
        exchange: ChatExchange,
        #[serde(skip)]
        origin: ChatOrigin,
    },
}

impl WorkspaceEvent {
    pub fn workspace_id(&self) -> &str {
        match self {
            Self::StateChanged { workspace } => &workspace.id,
            Self::Chat { exchange, .. } => &exchange.workspace_id,
        }
    }
}

/// Broadcast bus. Slow subscribers lose the oldest events rather than
/// blocking publishers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkspaceEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: WorkspaceEvent) {
        // No receivers is the common case outside of open sockets.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let record = WorkspaceRecord::new("demo", "demo", None, Utc::now());
        bus.publish(WorkspaceEvent::StateChanged { workspace: record });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.workspace_id(), "demo");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "state_changed");
        assert_eq!(json["workspace"]["state"], "pending");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        let exchange = ChatExchange::failed("demo", "hi");
        bus.publish(WorkspaceEvent::Chat {
            exchange,
            origin: ChatOrigin::Http,
        });
    }
}
