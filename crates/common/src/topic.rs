//! Canonical routing keys of the topic exchange.

use std::str::FromStr;

use thiserror::Error;

use crate::OrderStatus;

/// A routing key the order saga services publish to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    OrderCreated,
    OrderCancelled,
    PaymentApproved,
    PaymentDeclined,
    OrderShipped,
}

/// Returned when a routing key is not one of the canonical topics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown routing key: {0}")]
pub struct UnknownTopic(pub String);

impl Topic {
    /// All canonical topics.
    pub const ALL: [Topic; 5] = [
        Topic::OrderCreated,
        Topic::OrderCancelled,
        Topic::PaymentApproved,
        Topic::PaymentDeclined,
        Topic::OrderShipped,
    ];

    /// Returns the dotted routing key.
    pub fn routing_key(&self) -> &'static str {
        match self {
            Topic::OrderCreated => "order.created",
            Topic::OrderCancelled => "order.cancelled",
            Topic::PaymentApproved => "payment.approved",
            Topic::PaymentDeclined => "payment.declined",
            Topic::OrderShipped => "order.shipped",
        }
    }

    /// Returns the order status an event on this topic announces.
    pub fn status(&self) -> OrderStatus {
        match self {
            Topic::OrderCreated => OrderStatus::Created,
            Topic::OrderCancelled => OrderStatus::Cancelled,
            Topic::PaymentApproved => OrderStatus::Approved,
            Topic::PaymentDeclined => OrderStatus::Declined,
            Topic::OrderShipped => OrderStatus::Shipped,
        }
    }

    /// Returns true for the events the order ledger folds back into its records.
    pub fn is_terminal_event(&self) -> bool {
        matches!(
            self,
            Topic::PaymentApproved | Topic::PaymentDeclined | Topic::OrderShipped
        )
    }
}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.routing_key() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.routing_key())
    }
}
