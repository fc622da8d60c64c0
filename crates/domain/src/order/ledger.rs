//! The order ledger: owns order records and the creation/cancellation flow.

use common::{OrderId, OrderPayload, OrderStatus, Topic};
use event_bus::{EventBus, publish_json};
use storage::{Change, DocumentStore, GuardedStore};
use tracing::{error, info, warn};

use super::fold::fold_event;
use super::{FoldOutcome, NewOrder, Order, OrderBook, OrderError};
use crate::error::{DomainError, Result};

/// Order-facing front door.
///
/// Every read-modify-write of the order book goes through one
/// [`GuardedStore`], shared by the HTTP handlers and the fold subscriber.
pub struct OrderLedger<B> {
    store: GuardedStore<OrderBook>,
    bus: B,
}

impl<B: Clone> Clone for OrderLedger<B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<B: EventBus> OrderLedger<B> {
    pub fn new(store: impl DocumentStore<OrderBook> + 'static, bus: B) -> Self {
        Self {
            store: GuardedStore::new(store),
            bus,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Creates an order and publishes `order.created`.
    ///
    /// The order is persisted as `pending` first. If the publish fails the
    /// error is returned and the order stays `pending`.
    #[tracing::instrument(skip(self, request), fields(client_id = %request.client_id, product_id = %request.product_id))]
    pub async fn create_order(&self, request: NewOrder) -> Result<Order> {
        let quantity = request.validated_quantity()?;

        let order = self
            .store
            .update(|book| {
                let id = book.next_id();
                let order = Order::pending(id, request, quantity);
                book.orders.push(order.clone());
                Ok::<_, DomainError>(Change::Modified(order))
            })
            .await?;

        let payload = order.to_payload(OrderStatus::Created);
        if let Err(e) = publish_json(&self.bus, Topic::OrderCreated.routing_key(), &payload).await
        {
            error!(order_id = %order.id, error = %e, "Failed to publish order.created");
            return Err(e.into());
        }

        let order = self
            .store
            .update(|book| -> Result<Change<Order>> {
                let stored = book
                    .get_mut(order.id)
                    .ok_or(OrderError::OrderNotFound(order.id))?;
                if stored.status.can_mark_created() {
                    stored.status = OrderStatus::Created;
                    Ok(Change::Modified(stored.clone()))
                } else {
                    Ok(Change::Unchanged(stored.clone()))
                }
            })
            .await?;

        metrics::counter!("orders_created").increment(1);
        info!(order_id = %order.id, status = %order.status, "Order created");
        Ok(order)
    }

    /// Cancels an order and publishes `order.cancelled`.
    ///
    /// The order is stored as `cancelled` before the publish. If the publish
    /// fails the previous status is restored, so the cancellation can be
    /// retried and `order.cancelled` is never lost.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let (order, previous) = self
            .store
            .update(|book| -> Result<Change<(Order, OrderStatus)>> {
                let order = book
                    .get_mut(order_id)
                    .ok_or(OrderError::OrderNotFound(order_id))?;
                if order.status == OrderStatus::Shipped {
                    return Err(OrderError::AlreadyShipped(order_id).into());
                }
                if !order.status.can_cancel() {
                    return Err(OrderError::InvalidStateTransition {
                        order_id,
                        current: order.status,
                        action: "cancel",
                    }
                    .into());
                }
                let previous = order.status;
                order.status = OrderStatus::Cancelled;
                Ok(Change::Modified((order.clone(), previous)))
            })
            .await?;

        let payload = order.to_payload(OrderStatus::Cancelled);
        if let Err(e) =
            publish_json(&self.bus, Topic::OrderCancelled.routing_key(), &payload).await
        {
            error!(order_id = %order_id, error = %e, "Failed to publish order.cancelled");
            self.restore_status(order_id, OrderStatus::Cancelled, previous)
                .await;
            return Err(e.into());
        }

        metrics::counter!("orders_cancelled").increment(1);
        info!(order_id = %order_id, "Order cancelled");
        Ok(order)
    }

    /// Puts `previous` back if the order still holds `expected`.
    async fn restore_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        previous: OrderStatus,
    ) {
        let restored = self
            .store
            .update(|book| {
                let change = match book.get_mut(order_id) {
                    Some(order) if order.status == expected => {
                        order.status = previous;
                        Change::Modified(true)
                    }
                    _ => Change::Unchanged(false),
                };
                Ok::<_, DomainError>(change)
            })
            .await;

        match restored {
            Ok(true) => warn!(%order_id, status = %previous, "Order status restored"),
            Ok(false) => warn!(%order_id, "Order changed since cancellation, status left as is"),
            Err(e) => error!(%order_id, error = %e, "Failed to restore order status"),
        }
    }

    /// Returns every order, oldest first.
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.store.read().await?.orders)
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.store.read().await?.get(order_id).cloned())
    }

    /// Folds a terminal event into the local record.
    #[tracing::instrument(skip(self, payload), fields(order_id = %payload.id))]
    pub async fn fold(&self, topic: Topic, payload: &OrderPayload) -> Result<FoldOutcome> {
        let outcome = self
            .store
            .update(|book| Ok::<_, DomainError>(fold_event(book, topic, payload)))
            .await?;

        metrics::counter!("ledger_folds", "outcome" => outcome_label(&outcome)).increment(1);
        match outcome {
            FoldOutcome::Applied { from, to } => {
                info!(%from, %to, "Order status folded");
            }
            FoldOutcome::Reconciled => {
                metrics::counter!("ledger_reconciliations").increment(1);
                warn!(
                    %topic,
                    status = %topic.status(),
                    "Order missing locally, reconstructed from event payload"
                );
            }
            FoldOutcome::Stale { current, attempted } => {
                warn!(%current, %attempted, "Ignoring stale status event");
            }
            FoldOutcome::Duplicate | FoldOutcome::Ignored => {}
        }
        Ok(outcome)
    }
}

fn outcome_label(outcome: &FoldOutcome) -> &'static str {
    match outcome {
        FoldOutcome::Applied { .. } => "applied",
        FoldOutcome::Duplicate => "duplicate",
        FoldOutcome::Reconciled => "reconciled",
        FoldOutcome::Stale { .. } => "stale",
        FoldOutcome::Ignored => "ignored",
    }
}
