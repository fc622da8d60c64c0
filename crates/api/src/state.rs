//! Shared application state.

use std::sync::Arc;

use domain::{CartService, OrderLedger};
use saga::{NotificationRelay, StockCatalog};

use crate::warmup::Warmup;

/// Shared application state accessible from all handlers.
pub struct AppState<B> {
    pub ledger: OrderLedger<B>,
    pub cart: CartService,
    pub catalog: Arc<dyn StockCatalog>,
    pub relay: NotificationRelay,
    pub warmup: Warmup,
}
