//! Bus message handlers, one per participant reaction.

use std::str::FromStr;

use async_trait::async_trait;
use common::{OrderPayload, Topic};
use domain::OrderLedger;
use event_bus::{Delivery, EventBus, HandlerError, MessageHandler, publish_json};
use tracing::warn;

use crate::error::retryable;
use crate::services::{
    DeliveryDispatcher, InventoryStore, Notification, NotificationRelay, PaymentAuthority,
};

/// Debits stock on `order.created`.
///
/// A rejected reservation is logged and acknowledged; no event follows it.
pub struct ReserveStock {
    pub inventory: InventoryStore,
}

#[async_trait]
impl MessageHandler for ReserveStock {
    fn name(&self) -> &'static str {
        "inventory.reserve"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let order: OrderPayload = delivery.decode()?;
        match self.inventory.reserve_for_order(&order).await {
            Ok(_) => {
                metrics::counter!("inventory_reservations").increment(1);
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                metrics::counter!("inventory_reservations_rejected").increment(1);
                warn!(order_id = %order.id, error = %e, "Reservation rejected");
                Ok(())
            }
            Err(e) => Err(retryable(e)),
        }
    }
}

/// Credits stock back on `order.cancelled`.
pub struct ReleaseStock {
    pub inventory: InventoryStore,
}

#[async_trait]
impl MessageHandler for ReleaseStock {
    fn name(&self) -> &'static str {
        "inventory.release"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let order: OrderPayload = delivery.decode()?;
        match self.inventory.release_for_order(&order).await {
            Ok(_) => {
                metrics::counter!("inventory_releases").increment(1);
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                warn!(order_id = %order.id, error = %e, "Release rejected");
                Ok(())
            }
            Err(e) => Err(retryable(e)),
        }
    }
}

/// Authorizes payment on `order.created` and announces the verdict.
pub struct AuthorizePayment<B> {
    pub authority: PaymentAuthority,
    pub bus: B,
}

#[async_trait]
impl<B: EventBus> MessageHandler for AuthorizePayment<B> {
    fn name(&self) -> &'static str {
        "payment.authorize"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let order: OrderPayload = delivery.decode()?;
        let verdict = self.authority.authorize(&order).await;
        let settled = order.with_status(verdict.status());
        publish_json(&self.bus, verdict.topic().routing_key(), &settled)
            .await
            .map_err(retryable)
    }
}

/// Ships an order on `payment.approved`.
pub struct DispatchDelivery<B> {
    pub dispatcher: DeliveryDispatcher<B>,
}

#[async_trait]
impl<B: EventBus> MessageHandler for DispatchDelivery<B> {
    fn name(&self) -> &'static str {
        "delivery.dispatch"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let order: OrderPayload = delivery.decode()?;
        self.dispatcher.dispatch(&order).await.map_err(|e| {
            tracing::error!(order_id = %order.id, error = %e, "Failed to emit order.shipped");
            retryable(e)
        })
    }
}

/// Relays every event to the notification stream.
pub struct RelayNotification {
    pub relay: NotificationRelay,
}

#[async_trait]
impl MessageHandler for RelayNotification {
    fn name(&self) -> &'static str {
        "notification.relay"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        self.relay.relay(Notification {
            event: delivery.routing_key.clone(),
            data: delivery.payload.clone(),
        });
        Ok(())
    }
}

/// Folds terminal events into the order ledger.
pub struct FoldIntoLedger<B> {
    pub ledger: OrderLedger<B>,
}

#[async_trait]
impl<B: EventBus> MessageHandler for FoldIntoLedger<B> {
    fn name(&self) -> &'static str {
        "ledger.fold"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let topic = Topic::from_str(&delivery.routing_key)
            .map_err(|e| HandlerError::Malformed(e.to_string()))?;
        let order: OrderPayload = delivery.decode()?;
        self.ledger
            .fold(topic, &order)
            .await
            .map(|_| ())
            .map_err(retryable)
    }
}
