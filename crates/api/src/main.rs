//! Service host entry point.
//!
//! Runs the HTTP front door and every saga participant. With `BUS_URL` set
//! the participants talk over a NATS server, otherwise over an in-process
//! broker.

use std::sync::Arc;

use api::AppState;
use api::config::{Config, PaymentMode};
use api::warmup::Warmup;
use domain::{CartService, OrderLedger};
use event_bus::{
    Broker, BusConnector, EventBus, InMemoryDeadLetters, NatsConnector, RetryPolicy,
};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    HttpPaymentGateway, InventoryStore, NotificationRelay, Participants, PaymentAuthority,
    Services, Settings, SimulatedPaymentGateway,
};
use storage::JsonFileStore;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the bus
    match config.bus_url.clone() {
        Some(url) => {
            tracing::info!(%url, exchange = %config.bus_exchange, "using NATS bus");
            let connector = NatsConnector::new(url, config.bus_exchange.clone());
            run(&config, &connector, metrics_handle).await;
        }
        None => {
            tracing::info!(exchange = %config.bus_exchange, "using in-process bus");
            let broker = Broker::new(config.bus_exchange.clone());
            run(&config, &broker, metrics_handle).await;
            broker.shutdown().await;
        }
    }

    tracing::info!("server shut down gracefully");
}

fn payment_authority(config: &Config) -> PaymentAuthority {
    match config.payment_mode {
        PaymentMode::Http => PaymentAuthority::new(
            HttpPaymentGateway::new(&config.payment_gateway_url, config.payment_timeout)
                .expect("failed to build payment gateway client"),
        ),
        PaymentMode::Simulated { approval_rate } => {
            tracing::warn!(approval_rate, "payments are simulated");
            PaymentAuthority::new(SimulatedPaymentGateway::new(approval_rate))
        }
    }
}

async fn run<C: BusConnector>(config: &Config, connector: &C, metrics_handle: PrometheusHandle) {
    // 4. Open the local stores
    let data_dir = &config.data_dir;
    let ledger = OrderLedger::new(
        JsonFileStore::new(data_dir.join("orders.json")),
        connector.connect().await.expect("failed to connect to bus"),
    );
    let cart = CartService::new(JsonFileStore::new(data_dir.join("cart.json")));
    let inventory = InventoryStore::new(JsonFileStore::new(data_dir.join("stock.json")));
    let relay = NotificationRelay::default();

    // 5. Start the saga participants
    let participants = Participants::spawn(
        connector,
        Services {
            ledger: ledger.clone(),
            inventory: inventory.clone(),
            payments: payment_authority(config),
            relay: relay.clone(),
        },
        Settings {
            fulfillment_delay: config.fulfillment_delay,
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_backoff),
        },
        Arc::new(InMemoryDeadLetters::new()),
    )
    .await
    .expect("failed to start saga participants");

    // 6. Build the application
    let state = Arc::new(AppState {
        ledger: ledger.clone(),
        cart,
        catalog: Arc::new(inventory),
        relay,
        warmup: Warmup::new(config.warmup_urls.clone()),
    });
    let app = api::create_app(state, metrics_handle);

    // 7. Start server
    let addr = config.addr();
    tracing::info!(%addr, data_dir = %data_dir.display(), "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    participants.shutdown().await;
    ledger.bus().close().await;
}
