//! Integration tests for the order ledger.
//!
//! These run the ledger against an in-process broker and an in-memory order
//! book, checking what reaches the bus as well as what is stored.

use common::{ClientId, OrderId, OrderPayload, OrderStatus, ProductId, Topic};
use domain::{DomainError, FoldOutcome, NewOrder, OrderBook, OrderError, OrderLedger};
use event_bus::{Broker, BusConnection, BusError, EventBus, Queue};
use storage::InMemoryDocumentStore;

async fn setup() -> (OrderLedger<BusConnection>, BusConnection) {
    let broker = Broker::new("default");
    let ledger_conn = broker.connect().await.unwrap();
    let observer = broker.connect().await.unwrap();
    let ledger = OrderLedger::new(InMemoryDocumentStore::<OrderBook>::new(), ledger_conn);
    (ledger, observer)
}

fn request(quantity: i64) -> NewOrder {
    NewOrder {
        client_id: ClientId::new(1),
        product_id: ProductId::new(42),
        product_name: "Widget".to_string(),
        quantity,
    }
}

fn next_payload(queue: &mut Queue) -> OrderPayload {
    let delivery = queue.try_next().expect("expected a message on the queue");
    delivery.decode().unwrap()
}

mod create {
    use super::*;

    #[tokio::test]
    async fn assigns_sequential_ids_and_publishes_created() {
        let (ledger, observer) = setup().await;
        let mut queue = observer.declare_queue("order.created").await.unwrap();

        let first = ledger.create_order(request(2)).await.unwrap();
        let second = ledger.create_order(request(1)).await.unwrap();

        assert_eq!(first.id, OrderId::new(1));
        assert_eq!(second.id, OrderId::new(2));
        assert_eq!(first.status, OrderStatus::Created);

        let payload = next_payload(&mut queue);
        assert_eq!(payload.id, OrderId::new(1));
        assert_eq!(payload.status, OrderStatus::Created);
        assert_eq!(payload.quantity, 2);
        assert_eq!(payload.product_name, "Widget");
    }

    #[tokio::test]
    async fn rejects_non_positive_quantity_without_publishing() {
        let (ledger, observer) = setup().await;
        let mut queue = observer.declare_queue("#").await.unwrap();

        let err = ledger.create_order(request(0)).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidQuantity { quantity: 0 })
        ));
        assert!(ledger.list_orders().await.unwrap().is_empty());
        assert!(queue.try_next().is_none());
    }

    #[tokio::test]
    async fn publish_failure_leaves_order_pending() {
        let broker = Broker::new("default");
        let conn = broker.connect().await.unwrap();
        let ledger = OrderLedger::new(InMemoryDocumentStore::<OrderBook>::new(), conn.clone());
        conn.close().await;

        let err = ledger.create_order(request(1)).await.unwrap_err();
        assert!(matches!(err, DomainError::Bus(BusError::ConnectionClosed(_))));

        let orders = ledger.list_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn concurrent_creates_never_share_an_id() {
        let (ledger, _observer) = setup().await;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.create_order(request(1)).await.unwrap().id })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().value());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
    }
}

mod cancel {
    use super::*;

    #[tokio::test]
    async fn cancels_created_order_and_publishes() {
        let (ledger, observer) = setup().await;
        let mut queue = observer.declare_queue("order.cancelled").await.unwrap();
        let order = ledger.create_order(request(3)).await.unwrap();

        let cancelled = ledger.cancel_order(order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let payload = next_payload(&mut queue);
        assert_eq!(payload.id, order.id);
        assert_eq!(payload.status, OrderStatus::Cancelled);
        assert_eq!(payload.quantity, 3);

        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (ledger, _observer) = setup().await;
        let err = ledger.cancel_order(OrderId::new(99)).await.unwrap_err();
        assert!(matches!(err, DomainError::Order(OrderError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn shipped_order_cannot_be_cancelled() {
        let (ledger, _observer) = setup().await;
        let order = ledger.create_order(request(1)).await.unwrap();
        let payload = order.to_payload(OrderStatus::Approved);
        ledger.fold(Topic::PaymentApproved, &payload).await.unwrap();
        ledger.fold(Topic::OrderShipped, &payload).await.unwrap();

        let err = ledger.cancel_order(order.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Order(OrderError::AlreadyShipped(_))));
    }

    #[tokio::test]
    async fn approved_order_cannot_be_cancelled() {
        let (ledger, _observer) = setup().await;
        let order = ledger.create_order(request(1)).await.unwrap();
        ledger
            .fold(Topic::PaymentApproved, &order.to_payload(OrderStatus::Approved))
            .await
            .unwrap();

        let err = ledger.cancel_order(order.id).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidStateTransition {
                current: OrderStatus::Approved,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn publish_failure_restores_status_and_allows_retry() {
        let broker = Broker::new("default");
        let store = InMemoryDocumentStore::<OrderBook>::new();
        let conn = broker.connect().await.unwrap();
        let ledger = OrderLedger::new(store.clone(), conn.clone());
        let order = ledger.create_order(request(2)).await.unwrap();

        conn.close().await;
        let err = ledger.cancel_order(order.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Bus(BusError::ConnectionClosed(_))));

        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Created);

        // Reconnect over the same order book.
        let observer = broker.connect().await.unwrap();
        let mut queue = observer.declare_queue("order.cancelled").await.unwrap();
        let ledger = OrderLedger::new(store, broker.connect().await.unwrap());

        let cancelled = ledger.cancel_order(order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(next_payload(&mut queue).id, order.id);
    }

    #[tokio::test]
    async fn cancelling_twice_is_rejected() {
        let (ledger, _observer) = setup().await;
        let order = ledger.create_order(request(1)).await.unwrap();
        ledger.cancel_order(order.id).await.unwrap();

        assert!(ledger.cancel_order(order.id).await.is_err());
    }
}

mod fold {
    use super::*;

    #[tokio::test]
    async fn approval_then_shipment() {
        let (ledger, _observer) = setup().await;
        let order = ledger.create_order(request(1)).await.unwrap();
        let payload = order.to_payload(OrderStatus::Approved);

        let outcome = ledger.fold(Topic::PaymentApproved, &payload).await.unwrap();
        assert_eq!(
            outcome,
            FoldOutcome::Applied {
                from: OrderStatus::Created,
                to: OrderStatus::Approved
            }
        );
        ledger.fold(Topic::OrderShipped, &payload).await.unwrap();

        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn event_for_unknown_order_is_reconciled() {
        let (ledger, _observer) = setup().await;
        let payload = OrderPayload {
            id: OrderId::new(5),
            client_id: ClientId::new(3),
            product_id: ProductId::new(8),
            product_name: "Gizmo".to_string(),
            quantity: 4,
            status: OrderStatus::Approved,
        };

        let outcome = ledger.fold(Topic::PaymentApproved, &payload).await.unwrap();
        assert_eq!(outcome, FoldOutcome::Reconciled);

        let stored = ledger.get_order(OrderId::new(5)).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Approved);
        assert_eq!(stored.quantity, 4);

        let next = ledger.create_order(request(1)).await.unwrap();
        assert_eq!(next.id, OrderId::new(6));
    }

    #[tokio::test]
    async fn duplicate_event_changes_nothing() {
        let (ledger, _observer) = setup().await;
        let order = ledger.create_order(request(1)).await.unwrap();
        let payload = order.to_payload(OrderStatus::Declined);

        ledger.fold(Topic::PaymentDeclined, &payload).await.unwrap();
        let again = ledger.fold(Topic::PaymentDeclined, &payload).await.unwrap();

        assert_eq!(again, FoldOutcome::Duplicate);
        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Declined);
    }

    #[tokio::test]
    async fn approval_after_cancellation_is_stale() {
        let (ledger, _observer) = setup().await;
        let order = ledger.create_order(request(1)).await.unwrap();
        ledger.cancel_order(order.id).await.unwrap();

        let outcome = ledger
            .fold(Topic::PaymentApproved, &order.to_payload(OrderStatus::Approved))
            .await
            .unwrap();
        assert!(matches!(outcome, FoldOutcome::Stale { .. }));

        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
    }
}

#[tokio::test]
async fn get_unknown_order_returns_none() {
    let (ledger, _observer) = setup().await;
    assert!(ledger.get_order(OrderId::new(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn list_returns_orders_in_creation_order() {
    let (ledger, _observer) = setup().await;
    for _ in 0..3 {
        ledger.create_order(request(1)).await.unwrap();
    }
    let ids: Vec<u64> = ledger
        .list_orders()
        .await
        .unwrap()
        .iter()
        .map(|order| order.id.value())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}
