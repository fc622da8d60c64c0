//! Wires every participant's subscriber loops onto a bus.

use std::sync::Arc;
use std::time::Duration;

use common::Topic;
use domain::OrderLedger;
use event_bus::{
    BusConnector, CancellationToken, DeadLetterSink, EventBus, RetryPolicy, Subscriber,
};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::Result;
use crate::handlers::{
    AuthorizePayment, DispatchDelivery, FoldIntoLedger, RelayNotification, ReleaseStock,
    ReserveStock,
};
use crate::services::{DeliveryDispatcher, InventoryStore, NotificationRelay, PaymentAuthority};

/// The participants' local state, handed over at start-up.
pub struct Services<B> {
    pub ledger: OrderLedger<B>,
    pub inventory: InventoryStore,
    pub payments: PaymentAuthority,
    pub relay: NotificationRelay,
}

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub fulfillment_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fulfillment_delay: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Running subscriber loops for every participant.
///
/// Each participant other than the ledger gets its own connection. The
/// ledger's fold loops share the connection the ledger publishes on.
pub struct Participants<B> {
    cancel: CancellationToken,
    connections: Vec<B>,
    tasks: Vec<JoinHandle<()>>,
}

impl<B> Participants<B>
where
    B: EventBus + Clone + 'static,
{
    /// Opens the connections, declares every queue and starts one loop per
    /// queue. Returns once all queues are bound.
    #[tracing::instrument(skip_all, fields(exchange = connector.exchange()))]
    pub async fn spawn<C>(
        connector: &C,
        services: Services<B>,
        settings: Settings,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Result<Self>
    where
        C: BusConnector<Connection = B>,
    {
        let cancel = CancellationToken::new();
        let mut participants = Self {
            cancel: cancel.clone(),
            connections: Vec::new(),
            tasks: Vec::new(),
        };
        let subscriber = |conn: B| {
            Subscriber::new(conn, settings.retry, dead_letters.clone())
        };

        let inventory = participants.open(connector).await?;
        let payment = participants.open(connector).await?;
        let delivery = participants.open(connector).await?;
        let notification = participants.open(connector).await?;

        let inventory = subscriber(inventory);
        participants.track(
            inventory
                .spawn(
                    Topic::OrderCreated.routing_key(),
                    ReserveStock {
                        inventory: services.inventory.clone(),
                    },
                    cancel.clone(),
                )
                .await?,
        );
        participants.track(
            inventory
                .spawn(
                    Topic::OrderCancelled.routing_key(),
                    ReleaseStock {
                        inventory: services.inventory,
                    },
                    cancel.clone(),
                )
                .await?,
        );

        let handler = AuthorizePayment {
            authority: services.payments,
            bus: payment.clone(),
        };
        participants.track(
            subscriber(payment)
                .spawn(Topic::OrderCreated.routing_key(), handler, cancel.clone())
                .await?,
        );

        let handler = DispatchDelivery {
            dispatcher: DeliveryDispatcher::new(delivery.clone(), settings.fulfillment_delay),
        };
        participants.track(
            subscriber(delivery)
                .spawn(Topic::PaymentApproved.routing_key(), handler, cancel.clone())
                .await?,
        );

        participants.track(
            subscriber(notification)
                .spawn(
                    "#",
                    RelayNotification {
                        relay: services.relay,
                    },
                    cancel.clone(),
                )
                .await?,
        );

        let ledger = subscriber(services.ledger.bus().clone());
        let fold = Arc::new(FoldIntoLedger {
            ledger: services.ledger,
        });
        for topic in Topic::ALL.into_iter().filter(Topic::is_terminal_event) {
            participants.track(
                ledger
                    .spawn(topic.routing_key(), fold.clone(), cancel.clone())
                    .await?,
            );
        }

        info!(loops = participants.tasks.len(), "Saga participants started");
        Ok(participants)
    }

    async fn open<C>(&mut self, connector: &C) -> Result<B>
    where
        C: BusConnector<Connection = B>,
    {
        let conn = connector.connect().await?;
        self.connections.push(conn.clone());
        Ok(conn)
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Number of running subscriber loops.
    pub fn loop_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops every loop and closes the participants' connections.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for conn in &self.connections {
            conn.close().await;
        }
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Saga participants stopped");
    }
}
