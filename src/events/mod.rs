//! Event Bus: fan-out of `Event`s to whoever is watching a run.
//!
//! One `broadcast` channel per run id. Subscribing to a run that has not
//! started yet is fine — the channel is created lazily on first `emit` or
//! first `subscribe`, whichever comes first. Publishing with no active
//! subscribers is not an error; it is simply discarded by `broadcast`,
//! which is the fire-and-forget semantics the core wants.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::protocol::{Event, RunId};

const CHANNEL_CAPACITY: usize = 1024;

/// Topic-per-run publish/subscribe bus.
///
/// Cloning an `EventBus` is cheap; it shares the underlying map via `Arc`.
#[derive(Clone, Default)]
pub struct EventBus {
    topics: Arc<RwLock<HashMap<RunId, broadcast::Sender<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes an event to its run's topic, creating the topic if this
    /// is the first event seen for that run. Never fails: if nobody is
    /// listening, the event is simply dropped.
    pub async fn emit(&self, event: Event) {
        let run_id = event.run_id();
        let sender = self.sender_for(run_id).await;
        let _ = sender.send(event);
    }

    /// Subscribes to a run's topic, creating it if necessary.
    pub async fn subscribe(&self, run_id: RunId) -> broadcast::Receiver<Event> {
        self.sender_for(run_id).await.subscribe()
    }

    /// Run ids that currently have a topic, whether or not anyone is
    /// subscribed to it.
    pub async fn list_topics(&self) -> Vec<RunId> {
        self.topics.read().await.keys().copied().collect()
    }

    async fn sender_for(&self, run_id: RunId) -> broadcast::Sender<Event> {
        if let Some(sender) = self.topics.read().await.get(&run_id) {
            return sender.clone();
        }
        let mut topics = self.topics.write().await;
        topics
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::new_run_id;

    #[tokio::test]
    async fn subscriber_receives_events_for_its_run() {
        let bus = EventBus::new();
        let run_id = new_run_id();
        let mut rx = bus.subscribe(run_id).await;

        bus.emit(Event::RunStarted { run_id, goal: "goal".into() }).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.run_id(), run_id);
    }

    #[tokio::test]
    async fn emit_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        let run_id = new_run_id();
        bus.emit(Event::RunStarted { run_id, goal: "goal".into() }).await;
    }

    #[tokio::test]
    async fn subscribers_are_isolated_per_run() {
        let bus = EventBus::new();
        let run_a = new_run_id();
        let run_b = new_run_id();
        let mut rx_a = bus.subscribe(run_a).await;
        let mut rx_b = bus.subscribe(run_b).await;

        bus.emit(Event::RunStarted { run_id: run_a, goal: "a".into() }).await;

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.run_id(), run_a);
        assert!(rx_b.try_recv().is_err());
    }
}
