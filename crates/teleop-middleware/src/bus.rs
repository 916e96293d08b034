//! Headless, named-topic publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! Each topic name gets its own channel, created the first time somebody
//! publishes or subscribes to it.  In addition every event is copied onto a
//! global tap channel so monitors can follow whole topic trees with
//! [`EventBus::subscribe_prefix`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use teleop_types::{Event, Message, TeleopError};
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::transport::Transport;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    capacity: usize,
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
    tap: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::InvalidArgument`] for a zero capacity, which
    /// the broadcast channel cannot represent.
    pub fn new(capacity: usize) -> Result<Self, TeleopError> {
        if capacity == 0 {
            return Err(TeleopError::InvalidArgument(
                "event bus capacity must be at least 1".to_string(),
            ));
        }
        let (tap, _) = broadcast::channel(capacity);
        Ok(Self {
            capacity,
            topics: Arc::new(RwLock::new(HashMap::new())),
            tap,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish `payload` on `topic`.
    ///
    /// Returns the number of topic receivers that were handed the event.
    /// Monitors attached through [`subscribe_prefix`][Self::subscribe_prefix]
    /// are not counted.
    pub fn publish(&self, topic: &str, source: &str, payload: Message) -> usize {
        let event = Event::new(topic, source, payload);
        // The tap has no receivers unless something is monitoring.
        let _ = self.tap.send(event.clone());

        match self.sender(topic).send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(_)) => {
                trace!(topic, "published with no subscribers");
                0
            }
        }
    }

    /// Subscribe to a single named topic.
    pub fn subscribe(&self, topic: &str) -> TopicReceiver {
        TopicReceiver::new(topic, self.sender(topic).subscribe())
    }

    /// Subscribe to every topic whose name starts with `prefix`.
    ///
    /// An empty prefix follows all traffic on the bus.
    pub fn subscribe_prefix(&self, prefix: impl Into<String>) -> PrefixSubscriber {
        PrefixSubscriber {
            prefix: prefix.into(),
            receiver: self.tap.subscribe(),
        }
    }

    /// Names of all topics seen so far, sorted.
    pub fn topics(&self) -> Vec<String> {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = topics.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of live receivers on `topic` (zero for unknown topics).
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics.get(topic).map_or(0, |s| s.receiver_count())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn sender(&self, topic: &str) -> broadcast::Sender<Event> {
        {
            let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = topics.get(topic) {
                return sender.clone();
            }
        }
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        let (tap, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            capacity: DEFAULT_CAPACITY,
            topics: Arc::new(RwLock::new(HashMap::new())),
            tap,
        }
    }
}

impl Transport for EventBus {
    fn publish(&self, topic: &str, source: &str, payload: Message) -> Result<usize, TeleopError> {
        Ok(EventBus::publish(self, topic, source, payload))
    }

    fn subscribe(&self, topic: &str) -> TopicReceiver {
        EventBus::subscribe(self, topic)
    }
}

// ---------------------------------------------------------------------------
// Topic receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single named topic.
///
/// Obtained via [`EventBus::subscribe`] or any other [`Transport`].
#[derive(Debug)]
pub struct TopicReceiver {
    topic: String,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wrap a broadcast receiver; used by transports that bridge external
    /// traffic into a local channel.
    pub fn new(topic: impl Into<String>, receiver: broadcast::Receiver<Event>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

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

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

// ---------------------------------------------------------------------------
// Prefix subscriber
// ---------------------------------------------------------------------------

/// A subscriber that only delivers events whose topic starts with the given
/// prefix.
#[derive(Debug)]
pub struct PrefixSubscriber {
    prefix: String,
    receiver: broadcast::Receiver<Event>,
}

impl PrefixSubscriber {
    /// Wait for the next event that matches this subscriber's prefix.
    ///
    /// Returns `None` when the bus is closed and no further events will arrive.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.topic.starts_with(&self.prefix) => {
                    return Some(event);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(prefix = %self.prefix, lagged_by = n, "PrefixSubscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            EventBus::new(0),
            Err(TeleopError::InvalidArgument(_))
        ));
    }

    #[test]
    fn publish_without_subscribers_returns_zero() {
        let bus = EventBus::default();
        assert_eq!(bus.publish("MTMR/status", "test", Message::Empty), 0);
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe("MTMR/robot_state");

        let n = bus.publish(
            "MTMR/robot_state",
            "test",
            Message::Text("DVRK_EFFORT_CARTESIAN".into()),
        );
        assert_eq!(n, 1);

        let event = rx.recv().await?;
        assert_eq!(event.topic, "MTMR/robot_state");
        assert_eq!(event.source, "test");
        assert_eq!(event.payload, Message::Text("DVRK_EFFORT_CARTESIAN".into()));
        Ok(())
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe("MTML/status");
        let mut rx2 = bus.subscribe("MTML/status");

        assert_eq!(bus.publish("MTML/status", "test", Message::Empty), 2);

        let e1 = rx1.recv().await?;
        let e2 = rx2.recv().await?;
        assert_eq!(e1.id, e2.id);
        Ok(())
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_other_topics() {
        let bus = EventBus::default();
        let mut status = bus.subscribe("MTMR/status");
        let _other = bus.subscribe("MTMR/measured_cp");

        bus.publish("MTMR/measured_cp", "test", Message::Empty);

        let result = tokio::time::timeout(Duration::from_millis(50), status.recv()).await;
        assert!(result.is_err(), "status subscriber must not see measured_cp traffic");
    }

    #[tokio::test]
    async fn clones_share_channels() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let clone = bus.clone();
        let mut rx = bus.subscribe("MTMR/gripper_closed_event");

        clone.publish("MTMR/gripper_closed_event", "clone", Message::Flag(true));
        assert_eq!(rx.recv().await?.payload, Message::Flag(true));
        Ok(())
    }

    #[tokio::test]
    async fn prefix_subscriber_filters() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe_prefix("MTML/");

        bus.publish("MTMR/status", "test", Message::Empty);
        bus.publish("MTML/status", "test", Message::Flag(false));

        let event = sub.recv().await.expect("prefix subscriber must receive");
        assert_eq!(event.topic, "MTML/status");
        assert_eq!(event.payload, Message::Flag(false));
    }

    #[test]
    fn topics_are_listed_sorted() {
        let bus = EventBus::default();
        let _a = bus.subscribe("MTMR/status");
        bus.publish("MTML/status", "test", Message::Empty);
        assert_eq!(bus.topics(), vec!["MTML/status", "MTMR/status"]);
        assert_eq!(bus.subscriber_count("MTMR/status"), 1);
        assert_eq!(bus.subscriber_count("ghost"), 0);
    }

    #[tokio::test]
    async fn lag_on_slow_subscriber() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::new(4)?;
        let mut slow = bus.subscribe("MTMR/measured_cp");

        for _ in 0..100 {
            bus.publish("MTMR/measured_cp", "flood", Message::Empty);
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn works_through_transport_trait() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let transport: &dyn Transport = &bus;
        let mut rx = transport.subscribe("MTMR/status");
        assert_eq!(transport.publish("MTMR/status", "dyn", Message::Empty)?, 1);
        assert_eq!(rx.recv().await?.source, "dyn");
        Ok(())
    }
}
