//! `teleop-middleware` – publish/subscribe plumbing.
//!
//! The proxy never talks to a concrete middleware.  It publishes through the
//! [`Transport`] trait; the in-process [`EventBus`] is the reference
//! implementation used by the CLI and by tests.
//!
//! # Modules
//!
//! - [`transport`] – the [`Transport`] trait every pub/sub backend implements.
//! - [`bus`] – named-topic event bus built on Tokio broadcast channels.

pub mod bus;
pub mod transport;

pub use bus::{EventBus, PrefixSubscriber, TopicReceiver};
pub use transport::Transport;
