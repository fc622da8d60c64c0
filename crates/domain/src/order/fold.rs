//! Folding terminal saga events back into ledger records.

use common::{OrderPayload, OrderStatus, Topic};
use storage::Change;

use super::{Order, OrderBook};

/// What a fold did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    /// The record moved to the event's status.
    Applied { from: OrderStatus, to: OrderStatus },
    /// The record already had the event's status.
    Duplicate,
    /// The record was missing and was inserted from the payload.
    Reconciled,
    /// The event arrived after a later status and was not applied.
    Stale {
        current: OrderStatus,
        attempted: OrderStatus,
    },
    /// The topic does not drive the ledger.
    Ignored,
}

impl FoldOutcome {
    pub fn is_write(&self) -> bool {
        matches!(self, FoldOutcome::Applied { .. } | FoldOutcome::Reconciled)
    }
}

/// Applies one event to the book.
pub(crate) fn fold_event(
    book: &mut OrderBook,
    topic: Topic,
    payload: &OrderPayload,
) -> Change<FoldOutcome> {
    if !topic.is_terminal_event() {
        return Change::Unchanged(FoldOutcome::Ignored);
    }
    let target = topic.status();

    let Some(order) = book.get_mut(payload.id) else {
        let mut order = Order::from_payload(payload);
        order.status = target;
        book.sequence.observe(order.id);
        book.orders.push(order);
        return Change::Modified(FoldOutcome::Reconciled);
    };

    let current = order.status;
    if current == target {
        Change::Unchanged(FoldOutcome::Duplicate)
    } else if current.can_fold_to(target) {
        order.status = target;
        Change::Modified(FoldOutcome::Applied {
            from: current,
            to: target,
        })
    } else {
        Change::Unchanged(FoldOutcome::Stale {
            current,
            attempted: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ClientId, OrderId, ProductId};

    fn payload(id: u64) -> OrderPayload {
        OrderPayload {
            id: OrderId::new(id),
            client_id: ClientId::new(9),
            product_id: ProductId::new(5),
            product_name: "Gizmo".to_string(),
            quantity: 2,
            status: OrderStatus::Created,
        }
    }

    fn book_with(status: OrderStatus) -> OrderBook {
        let mut order = Order::from_payload(&payload(1));
        order.status = status;
        OrderBook {
            sequence: Default::default(),
            orders: vec![order],
        }
    }

    #[test]
    fn approval_moves_created_order() {
        let mut book = book_with(OrderStatus::Created);
        let change = fold_event(&mut book, Topic::PaymentApproved, &payload(1));
        assert!(change.is_modified());
        assert_eq!(
            change.into_inner(),
            FoldOutcome::Applied {
                from: OrderStatus::Created,
                to: OrderStatus::Approved
            }
        );
        assert_eq!(book.orders[0].status, OrderStatus::Approved);
    }

    #[test]
    fn shipment_after_approval_is_applied() {
        let mut book = book_with(OrderStatus::Approved);
        let outcome = fold_event(&mut book, Topic::OrderShipped, &payload(1)).into_inner();
        assert!(outcome.is_write());
        assert_eq!(book.orders[0].status, OrderStatus::Shipped);
    }

    #[test]
    fn shipment_seen_before_approval_wins() {
        let mut book = book_with(OrderStatus::Created);
        let outcome = fold_event(&mut book, Topic::OrderShipped, &payload(1)).into_inner();
        assert!(outcome.is_write());

        let late = fold_event(&mut book, Topic::PaymentApproved, &payload(1)).into_inner();
        assert!(matches!(late, FoldOutcome::Stale { .. }));
        assert_eq!(book.orders[0].status, OrderStatus::Shipped);
    }

    #[test]
    fn repeated_status_is_a_duplicate() {
        let mut book = book_with(OrderStatus::Approved);
        let change = fold_event(&mut book, Topic::PaymentApproved, &payload(1));
        assert!(!change.is_modified());
        assert_eq!(change.into_inner(), FoldOutcome::Duplicate);
    }

    #[test]
    fn late_approval_does_not_regress_shipped_order() {
        let mut book = book_with(OrderStatus::Shipped);
        let change = fold_event(&mut book, Topic::PaymentApproved, &payload(1));
        assert!(!change.is_modified());
        assert_eq!(
            change.into_inner(),
            FoldOutcome::Stale {
                current: OrderStatus::Shipped,
                attempted: OrderStatus::Approved
            }
        );
        assert_eq!(book.orders[0].status, OrderStatus::Shipped);
    }

    #[test]
    fn cancelled_order_is_not_revived() {
        let mut book = book_with(OrderStatus::Cancelled);
        let outcome = fold_event(&mut book, Topic::PaymentApproved, &payload(1)).into_inner();
        assert!(matches!(outcome, FoldOutcome::Stale { .. }));
        assert_eq!(book.orders[0].status, OrderStatus::Cancelled);
    }

    #[test]
    fn missing_order_is_reconciled_with_event_status() {
        let mut book = OrderBook::default();
        let change = fold_event(&mut book, Topic::PaymentDeclined, &payload(8));
        assert!(change.is_modified());
        assert_eq!(change.into_inner(), FoldOutcome::Reconciled);
        assert_eq!(book.orders.len(), 1);
        assert_eq!(book.orders[0].status, OrderStatus::Declined);
        assert_eq!(book.orders[0].product_name, "Gizmo");
        assert_eq!(book.next_id(), OrderId::new(9));
    }

    #[test]
    fn non_terminal_topics_are_ignored() {
        let mut book = book_with(OrderStatus::Created);
        for topic in [Topic::OrderCreated, Topic::OrderCancelled] {
            let outcome = fold_event(&mut book, topic, &payload(1)).into_inner();
            assert_eq!(outcome, FoldOutcome::Ignored);
        }
        assert_eq!(book.orders[0].status, OrderStatus::Created);
    }
}
