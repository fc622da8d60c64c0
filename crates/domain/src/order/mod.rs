//! Orders and the ledger that owns them.

mod book;
mod fold;
mod ledger;
mod model;

pub use book::{OrderBook, SequenceGenerator};
pub use common::OrderStatus;
pub use fold::FoldOutcome;
pub use ledger::OrderLedger;
pub use model::{NewOrder, Order};

use common::OrderId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Quantity must be positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// No order with this id exists.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order was already shipped and can no longer be cancelled.
    #[error("Order {0} has already shipped")]
    AlreadyShipped(OrderId),

    /// The order is not in a status that allows the action.
    #[error("Invalid state transition: cannot {action} order {order_id} in {current} status")]
    InvalidStateTransition {
        order_id: OrderId,
        current: OrderStatus,
        action: &'static str,
    },
}
