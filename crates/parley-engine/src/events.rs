// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine event stream.
//!
//! The transport layer subscribes to these to notify users; the engine
//! itself never waits on a subscriber.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::trace;

use parley_core::{DialogId, EndReason, TopicId, UserId};

/// Something a user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A dialog was formed, from the queue or from a topic.
    Matched {
        dialog_id: DialogId,
        users: [UserId; 2],
        topic_id: Option<TopicId>,
    },
    /// A search reached its deadline without a partner.
    SearchTimedOut { user: UserId },
    /// A dialog was terminated. `ended_by` is unset for expiry.
    DialogEnded {
        dialog_id: DialogId,
        users: [UserId; 2],
        reason: EndReason,
        ended_by: Option<UserId>,
    },
    /// A topic was consumed by a dialog.
    TopicConsumed {
        topic_id: TopicId,
        owner: UserId,
        joiner: UserId,
        dialog_id: DialogId,
    },
    UserBanned { user: UserId, until: DateTime<Utc> },
}

/// Cloneable sender half of the event stream.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publishes `event`. Having no subscribers is not an error.
    pub fn emit(&self, event: EngineEvent) {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            trace!(?event, "no event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        bus.emit(EngineEvent::SearchTimedOut { user: UserId(7) });
        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::SearchTimedOut { user: UserId(7) }
        );
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new(0);
        bus.emit(EngineEvent::SearchTimedOut { user: UserId(1) });
    }
}
