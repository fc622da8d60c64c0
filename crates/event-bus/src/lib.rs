//! Topic-based publish/subscribe bus for the order saga services.
//!
//! This crate provides:
//! - [`EventBus`] trait: publish by routing key, declare exclusive queues bound to a pattern
//! - [`BusConnector`]: opens connections, so services run on either backend
//! - [`Broker`] / [`BusConnection`]: in-process topic exchange with explicit connection lifecycle
//! - [`NatsConnector`] / [`NatsConnection`]: the same exchange carried over a NATS server
//! - [`TopicPattern`]: `*` / `#` routing key matching
//! - [`MessageHandler`] and [`Subscriber`]: one sequential loop per bound queue,
//!   acknowledging only after the handler succeeds, with bounded retry and a dead-letter sink

pub mod broker;
pub mod bus;
pub mod connector;
pub mod dead_letter;
pub mod error;
pub mod handler;
pub mod message;
pub mod nats;
pub mod pattern;
pub mod subscription;

pub use broker::{Broker, BusConnection};
pub use bus::{EventBus, Queue, publish_json};
pub use connector::BusConnector;
pub use dead_letter::{DeadLetter, DeadLetterSink, InMemoryDeadLetters};
pub use error::{BusError, HandlerError, Result};
pub use handler::MessageHandler;
pub use message::Delivery;
pub use nats::{NatsConnection, NatsConnector};
pub use pattern::TopicPattern;
pub use subscription::{RetryPolicy, Subscriber};
pub use tokio_util::sync::CancellationToken;
