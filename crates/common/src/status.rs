//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Created ──┬──► Approved ──► Shipped
///    │           │      └──► Declined
///    │           │
///    ├───────────┴──► Cancelled
///    └──► Approved | Declined   (payment outcome folded before creation settles)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Assigned at creation, before `order.created` is published.
    #[default]
    Pending,

    /// `order.created` was published.
    Created,

    /// Payment was approved, delivery is pending.
    Approved,

    /// Payment was declined (terminal state).
    Declined,

    /// The order was shipped (terminal state).
    Shipped,

    /// The order was cancelled on request (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if a successful creation publish can settle this status.
    pub fn can_mark_created(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if a payment outcome can be folded into this status.
    pub fn can_settle_payment(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Created)
    }

    /// Returns true if the order can be shipped from this status.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Approved)
    }

    /// Returns true if a cancellation request is accepted in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Created)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match next {
            OrderStatus::Pending => false,
            OrderStatus::Created => self.can_mark_created(),
            OrderStatus::Approved | OrderStatus::Declined => self.can_settle_payment(),
            OrderStatus::Shipped => self.can_ship(),
            OrderStatus::Cancelled => self.can_cancel(),
        }
    }

    /// Returns true if a terminal event carrying `next` may be folded into
    /// `self`.
    ///
    /// Same as [`can_transition_to`](Self::can_transition_to), except that a
    /// shipment observed before its approval is taken as implying it.
    pub fn can_fold_to(&self, next: OrderStatus) -> bool {
        self.can_transition_to(next)
            || (next == OrderStatus::Shipped && self.can_settle_payment())
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Declined | OrderStatus::Shipped | OrderStatus::Cancelled
        )
    }

    /// Returns the status name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Created => "created",
            OrderStatus::Approved => "approved",
            OrderStatus::Declined => "declined",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
