//! Headless, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! Topics are plain strings (e.g. `/dg__device__joint_positions`) and their
//! channels are created on first use, by a publisher or a subscriber.  Every
//! event published on a topic is also mirrored onto a global channel so that
//! bridges to the outside world (see [`ws_server`][crate::ws_server]) can
//! forward the whole traffic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use dgm_types::{DgmError, Event};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    capacity: usize,
    // Global channel carrying every event.
    sender: broadcast::Sender<Event>,
    // Per-topic channels, created lazily.
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Event>>>>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            capacity,
            sender,
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // -----------------------------------------------------------------------
    // Topic-based API
    // -----------------------------------------------------------------------

    /// Publish `event` on `topic` and mirror it onto the global channel.
    ///
    /// Returns the number of topic subscribers that were handed the event.
    /// Returns `Ok(0)` when nobody listens on the topic; this is a normal
    /// condition for a robot publishing before any client connected.
    pub fn publish_to(&self, topic: &str, event: Event) -> Result<usize, DgmError> {
        let sender = self.topic_sender(topic);
        // Mirroring is best effort: no global subscriber is not an error.
        let _ = self.sender.send(event.clone());
        match sender.send(event) {
            Ok(n) => Ok(n),
            Err(broadcast::error::SendError(_)) => Ok(0),
        }
    }

    /// Subscribe to a single topic.
    pub fn subscribe_to(&self, topic: &str) -> TopicReceiver {
        TopicReceiver {
            topic: topic.to_string(),
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Names of every topic a publisher or subscriber has touched.
    pub fn topics(&self) -> Vec<String> {
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = topics.keys().cloned().collect();
        names.sort();
        names
    }

    // -----------------------------------------------------------------------
    // Global API
    // -----------------------------------------------------------------------

    /// Publish an event on the global channel only.
    ///
    /// # Errors
    ///
    /// Returns [`DgmError::Channel`] when no global subscriber is listening.
    pub fn publish(&self, event: Event) -> Result<usize, DgmError> {
        self.sender
            .send(event)
            .map_err(|e| DgmError::Channel(format!("event bus send error: {e}")))
    }

    /// Subscribe to every event, whatever its topic.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<Event> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic receiver
// ---------------------------------------------------------------------------

/// A receiver bound to a single topic.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: String,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv], for draining from the
    /// synchronous control loop.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The topic this receiver is bound to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dgm_types::{EventPayload, TopicMessage};
    use uuid::Uuid;

    fn make_event(topic: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: "dgm-middleware::test".to_string(),
            payload: EventPayload::SignalSample {
                topic: topic.to_string(),
                signal: "device__q".to_string(),
                time: 0,
                message: TopicMessage::Vector(vec![1.0, 2.0]),
            },
        }
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = make_event("/dg__device__q");
        bus.publish(event.clone())?;

        let received = rx.recv().await?;
        assert_eq!(received.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        assert!(bus.publish(make_event("/x")).is_err());
    }

    #[test]
    fn publish_to_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to("/dg__device__q", make_event("/dg__device__q")), Ok(0));
        assert_eq!(bus.topics(), vec!["/dg__device__q"]);
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to("/dg__device__q");
        let mut subscriber2 = bus.subscribe_to("/dg__device__q");

        let event = make_event("/dg__device__q");
        assert_eq!(bus.publish_to("/dg__device__q", event.clone())?, 2);

        assert_eq!(subscriber1.recv().await?.id, event.id);
        assert_eq!(subscriber2.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut other = bus.subscribe_to("/dg__device__v");

        bus.publish_to("/dg__device__q", make_event("/dg__device__q"))?;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            other.recv(),
        )
        .await;
        assert!(result.is_err(), "subscriber on another topic must not receive the event");
        Ok(())
    }

    #[test]
    fn topic_events_are_mirrored_globally() {
        let bus = EventBus::default();
        let mut global = bus.subscribe();
        let event = make_event("/dg__device__q");
        bus.publish_to("/dg__device__q", event.clone()).unwrap();
        assert_eq!(global.try_recv().unwrap().id, event.id);
    }

    #[test]
    fn try_recv_drains_pending_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to("/t");
        assert_eq!(rx.topic(), "/t");
        bus.publish_to("/t", make_event("/t")).unwrap();
        bus.publish_to("/t", make_event("/t")).unwrap();
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        const CAPACITY: usize = 16;
        let bus = EventBus::new(CAPACITY);
        let mut slow_sub = bus.subscribe_to("/flood");

        for _ in 0..1_000 {
            let _ = bus.publish_to("/flood", make_event("/flood"));
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
