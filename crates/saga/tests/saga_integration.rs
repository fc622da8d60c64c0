//! End-to-end tests for the choreographed order saga.
//!
//! Every participant runs on one in-process broker, with in-memory stores
//! and a scripted payment gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{ClientId, OrderId, OrderPayload, OrderStatus, ProductId, Topic};
use domain::{NewOrder, OrderBook, OrderLedger};
use event_bus::{Broker, BusConnection, EventBus, InMemoryDeadLetters, RetryPolicy, publish_json};
use saga::{
    AuthorizationRequest, InMemoryPaymentGateway, InventoryStore, NotificationRelay,
    Participants, PaymentAuthority, PaymentError, PaymentGateway, Product, Services, Settings,
    StockDocument, Verdict,
};
use storage::InMemoryDocumentStore;
use tokio::sync::Notify;

macro_rules! eventually {
    ($cond:expr) => {{
        let mut reached = false;
        for _ in 0..300 {
            if $cond {
                reached = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reached, "condition not reached in time: {}", stringify!($cond));
    }};
}

/// Holds every authorization until released.
struct GatedGateway {
    gate: Arc<Notify>,
    verdict: Verdict,
}

#[async_trait]
impl PaymentGateway for GatedGateway {
    async fn authorize(&self, _request: &AuthorizationRequest) -> Result<Verdict, PaymentError> {
        self.gate.notified().await;
        Ok(self.verdict)
    }
}

struct Harness {
    broker: Broker,
    ledger: OrderLedger<BusConnection>,
    inventory: InventoryStore,
    relay: NotificationRelay,
    dead_letters: InMemoryDeadLetters,
    participants: Participants<BusConnection>,
}

impl Harness {
    async fn start(gateway: impl PaymentGateway + 'static) -> Self {
        let broker = Broker::new("default");
        let ledger = OrderLedger::new(
            InMemoryDocumentStore::<OrderBook>::new(),
            broker.connect().await.unwrap(),
        );
        let inventory = InventoryStore::new(InMemoryDocumentStore::<StockDocument>::new());
        inventory
            .seed(vec![Product::new(42u64, "Widget", 10)])
            .await
            .unwrap();
        let relay = NotificationRelay::default();
        let dead_letters = InMemoryDeadLetters::new();

        let participants = Participants::spawn(
            &broker,
            Services {
                ledger: ledger.clone(),
                inventory: inventory.clone(),
                payments: PaymentAuthority::new(gateway),
                relay: relay.clone(),
            },
            Settings {
                fulfillment_delay: Duration::from_millis(10),
                retry: RetryPolicy::new(3, Duration::from_millis(10)),
            },
            Arc::new(dead_letters.clone()),
        )
        .await
        .unwrap();

        Self {
            broker,
            ledger,
            inventory,
            relay,
            dead_letters,
            participants,
        }
    }

    async fn status(&self, id: OrderId) -> Option<OrderStatus> {
        self.ledger
            .get_order(id)
            .await
            .unwrap()
            .map(|order| order.status)
    }

    async fn stock(&self) -> u32 {
        self.inventory.query_stock(ProductId::new(42)).await.unwrap()
    }
}

fn request(quantity: i64) -> NewOrder {
    NewOrder {
        client_id: ClientId::new(1),
        product_id: ProductId::new(42),
        product_name: "Widget".to_string(),
        quantity,
    }
}

#[tokio::test]
async fn approved_order_is_debited_and_shipped() {
    let harness = Harness::start(InMemoryPaymentGateway::approving()).await;
    let mut notifications = harness.relay.listen();

    let order = harness.ledger.create_order(request(2)).await.unwrap();
    assert_eq!(order.status, OrderStatus::Created);

    eventually!(harness.stock().await == 8);
    eventually!(harness.status(order.id).await == Some(OrderStatus::Shipped));

    let mut events = Vec::new();
    while events.len() < 3 {
        events.push(notifications.recv().await.unwrap().event);
    }
    assert_eq!(
        events,
        vec!["order.created", "payment.approved", "order.shipped"]
    );
    assert!(harness.dead_letters.is_empty().await);
}

#[tokio::test]
async fn declined_order_keeps_its_debit() {
    let harness = Harness::start(InMemoryPaymentGateway::declining()).await;

    let order = harness.ledger.create_order(request(2)).await.unwrap();

    eventually!(harness.status(order.id).await == Some(OrderStatus::Declined));
    eventually!(harness.stock().await == 8);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.status(order.id).await, Some(OrderStatus::Declined));
}

#[tokio::test]
async fn unreachable_gateway_declines() {
    let gateway = InMemoryPaymentGateway::approving();
    gateway.set_unavailable(true).await;
    let harness = Harness::start(gateway).await;

    let order = harness.ledger.create_order(request(1)).await.unwrap();

    eventually!(harness.status(order.id).await == Some(OrderStatus::Declined));
}

#[tokio::test]
async fn cancellation_releases_stock_and_survives_late_approval() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::start(GatedGateway {
        gate: gate.clone(),
        verdict: Verdict::Approved,
    })
    .await;

    let order = harness.ledger.create_order(request(3)).await.unwrap();
    eventually!(harness.stock().await == 7);

    let cancelled = harness.ledger.cancel_order(order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    eventually!(harness.stock().await == 10);

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.status(order.id).await, Some(OrderStatus::Cancelled));
}

#[tokio::test]
async fn insufficient_stock_emits_nothing_from_inventory() {
    let harness = Harness::start(InMemoryPaymentGateway::declining()).await;

    let order = harness.ledger.create_order(request(50)).await.unwrap();

    eventually!(harness.status(order.id).await == Some(OrderStatus::Declined));
    assert_eq!(harness.stock().await, 10);
    assert!(harness.dead_letters.is_empty().await);
}

#[tokio::test]
async fn approval_for_unknown_order_is_reconciled() {
    let harness = Harness::start(InMemoryPaymentGateway::approving()).await;
    let publisher = harness.broker.connect().await.unwrap();
    let payload = OrderPayload {
        id: OrderId::new(77),
        client_id: ClientId::new(5),
        product_id: ProductId::new(42),
        product_name: "Widget".to_string(),
        quantity: 1,
        status: OrderStatus::Approved,
    };

    publish_json(&publisher, Topic::PaymentApproved.routing_key(), &payload)
        .await
        .unwrap();

    eventually!(harness.status(OrderId::new(77)).await.is_some());
    eventually!(harness.status(OrderId::new(77)).await == Some(OrderStatus::Shipped));

    let next = harness.ledger.create_order(request(1)).await.unwrap();
    assert_eq!(next.id, OrderId::new(78));
}

#[tokio::test]
async fn redelivered_creation_is_applied_once() {
    let harness = Harness::start(InMemoryPaymentGateway::approving()).await;
    let publisher = harness.broker.connect().await.unwrap();
    let payload = OrderPayload {
        id: OrderId::new(1),
        client_id: ClientId::new(1),
        product_id: ProductId::new(42),
        product_name: "Widget".to_string(),
        quantity: 4,
        status: OrderStatus::Created,
    };

    for _ in 0..2 {
        publish_json(&publisher, Topic::OrderCreated.routing_key(), &payload)
            .await
            .unwrap();
    }

    eventually!(harness.status(OrderId::new(1)).await == Some(OrderStatus::Shipped));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.stock().await, 6);
}

#[tokio::test]
async fn malformed_event_is_dead_lettered() {
    let harness = Harness::start(InMemoryPaymentGateway::approving()).await;
    let publisher = harness.broker.connect().await.unwrap();

    publisher
        .publish("order.created", serde_json::json!({"id": "not-a-number"}))
        .await
        .unwrap();

    // Inventory and payment both reject it.
    eventually!(harness.dead_letters.len().await == 2);
    assert_eq!(harness.stock().await, 10);
}

#[tokio::test]
async fn shutdown_stops_every_loop() {
    let harness = Harness::start(InMemoryPaymentGateway::approving()).await;
    assert_eq!(harness.participants.loop_count(), 8);

    let broker = harness.broker.clone();
    let queues_before = broker.queue_count().await;
    harness.participants.shutdown().await;

    // The ledger's own connection stays open; its three fold queues remain.
    assert_eq!(queues_before, 8);
    assert_eq!(broker.queue_count().await, 3);
}
