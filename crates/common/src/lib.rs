//! Shared types for the order saga services.
//!
//! Every service speaks the same event contract: a dotted routing key
//! ([`Topic`]) and a JSON [`OrderPayload`] carrying an order snapshot.

pub mod payload;
pub mod status;
pub mod topic;
pub mod types;

pub use payload::OrderPayload;
pub use status::OrderStatus;
pub use topic::{Topic, UnknownTopic};
pub use types::{ClientId, OrderId, ProductId};
