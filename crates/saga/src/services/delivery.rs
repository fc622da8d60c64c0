//! Delivery dispatcher: ships approved orders after a fulfillment delay.

use std::time::{Duration, Instant};

use common::{OrderPayload, OrderStatus, Topic};
use event_bus::{BusError, EventBus, publish_json};
use tracing::info;

#[derive(Clone)]
pub struct DeliveryDispatcher<B> {
    bus: B,
    delay: Duration,
}

impl<B: EventBus> DeliveryDispatcher<B> {
    pub fn new(bus: B, delay: Duration) -> Self {
        Self { bus, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits out the fulfillment delay, then publishes `order.shipped`.
    ///
    /// Only the calling task waits.
    #[tracing::instrument(skip_all, fields(order_id = %order.id))]
    pub async fn dispatch(&self, order: &OrderPayload) -> Result<(), BusError> {
        let started = Instant::now();
        tokio::time::sleep(self.delay).await;

        let shipped = order.with_status(OrderStatus::Shipped);
        publish_json(&self.bus, Topic::OrderShipped.routing_key(), &shipped).await?;

        metrics::counter!("deliveries_dispatched").increment(1);
        metrics::histogram!("delivery_dispatch_seconds").record(started.elapsed().as_secs_f64());
        info!("Order shipped");
        Ok(())
    }
}
