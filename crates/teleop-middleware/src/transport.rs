//! The generic pub/sub seam.
//!
//! Anything that can deliver a [`Message`] on a named topic and hand back a
//! receiver for a named topic can carry proxy traffic: the in-process
//! [`EventBus`][crate::bus::EventBus], or an adapter that forwards to an
//! external robotics middleware.

use teleop_types::{Message, TeleopError};

use crate::bus::TopicReceiver;

/// One-way, asynchronous, topic-addressed message delivery.
///
/// # Contract
///
/// * `publish` – returns the number of receivers the message was handed to.
///   Zero receivers is a normal condition and yields `Ok(0)`.
///
/// * `subscribe` – returns a receiver that yields every message published on
///   exactly `topic` after the call returns.
pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, source: &str, payload: Message) -> Result<usize, TeleopError>;

    fn subscribe(&self, topic: &str) -> TopicReceiver;
}
