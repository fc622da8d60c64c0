//! Inventory store: product stock, debited and credited by order events.

use async_trait::async_trait;
use common::{OrderId, OrderPayload, ProductId};
use serde::{Deserialize, Serialize};
use storage::{Change, DocumentStore, GuardedStore};
use tracing::info;

use crate::error::InventoryError;

type Result<T> = std::result::Result<T, InventoryError>;

/// A product and its current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub stock: u32,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, stock: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stock,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Reserve,
    Release,
}

/// A stock change applied on behalf of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub order_id: OrderId,
    pub kind: MovementKind,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Movements [`InventoryStore::new`] keeps before dropping the oldest.
pub const DEFAULT_MOVEMENT_RETENTION: usize = 10_000;

/// Persisted inventory document.
///
/// `movements` is the idempotency record for order events, oldest first. It
/// keeps only the most recent movements, so a redelivery older than the
/// retention window would be applied again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDocument {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub movements: Vec<Movement>,
}

impl StockDocument {
    fn product_mut(&mut self, id: ProductId) -> Result<&mut Product> {
        self.products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(InventoryError::ProductNotFound(id))
    }

    fn has_movement(&self, order_id: OrderId, kind: MovementKind) -> bool {
        self.movements
            .iter()
            .rev()
            .any(|m| m.order_id == order_id && m.kind == kind)
    }

    fn prune_movements(&mut self, keep: usize) {
        let excess = self.movements.len().saturating_sub(keep);
        self.movements.drain(..excess);
    }
}

fn debit(product: &mut Product, quantity: u32) -> Result<u32> {
    if product.stock < quantity {
        return Err(InventoryError::InsufficientStock {
            product_id: product.id,
            available: product.stock,
            requested: quantity,
        });
    }
    product.stock -= quantity;
    Ok(product.stock)
}

fn credit(product: &mut Product, quantity: u32) -> u32 {
    product.stock = product.stock.saturating_add(quantity);
    product.stock
}

/// Result of applying an order's stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// The movement was applied; carries the product's new stock.
    Applied { stock: u32 },
    /// This order's movement of this kind was applied before.
    AlreadyApplied,
}

/// Read access to the product catalog, as served by the inventory.
#[async_trait]
pub trait StockCatalog: Send + Sync {
    async fn products(&self) -> Result<Vec<Product>>;

    async fn product(&self, id: ProductId) -> Result<Product>;
}

/// Owner of the stock document.
#[derive(Clone)]
pub struct InventoryStore {
    store: GuardedStore<StockDocument>,
    retention: usize,
}

impl InventoryStore {
    pub fn new(store: impl DocumentStore<StockDocument> + 'static) -> Self {
        Self::with_retention(store, DEFAULT_MOVEMENT_RETENTION)
    }

    /// Keeps at most `retention` order movements.
    pub fn with_retention(
        store: impl DocumentStore<StockDocument> + 'static,
        retention: usize,
    ) -> Self {
        Self {
            store: GuardedStore::new(store),
            retention,
        }
    }

    /// Inserts products, replacing name and stock of ids already present.
    #[tracing::instrument(skip_all, fields(count = products.len()))]
    pub async fn seed(&self, products: Vec<Product>) -> Result<()> {
        self.store
            .update(|doc| -> Result<Change<()>> {
                for product in products {
                    match doc.products.iter_mut().find(|p| p.id == product.id) {
                        Some(existing) => *existing = product,
                        None => doc.products.push(product),
                    }
                }
                Ok(Change::Modified(()))
            })
            .await
    }

    /// Debits `quantity` from the product and returns the new stock.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<u32> {
        self.store
            .update(|doc| -> Result<Change<u32>> {
                let stock = debit(doc.product_mut(product_id)?, quantity)?;
                Ok(Change::Modified(stock))
            })
            .await
    }

    /// Credits `quantity` to the product and returns the new stock.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, product_id: ProductId, quantity: u32) -> Result<u32> {
        self.store
            .update(|doc| -> Result<Change<u32>> {
                let stock = credit(doc.product_mut(product_id)?, quantity);
                Ok(Change::Modified(stock))
            })
            .await
    }

    pub async fn query_stock(&self, product_id: ProductId) -> Result<u32> {
        Ok(self.get_product(product_id).await?.stock)
    }

    pub async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .read()
            .await?
            .products
            .into_iter()
            .find(|p| p.id == product_id)
            .ok_or(InventoryError::ProductNotFound(product_id))
    }

    pub async fn list_stock(&self) -> Result<Vec<Product>> {
        Ok(self.store.read().await?.products)
    }

    /// Debits stock for an order once. A repeated call for the same order is
    /// a no-op.
    #[tracing::instrument(skip_all, fields(order_id = %order.id, product_id = %order.product_id))]
    pub async fn reserve_for_order(&self, order: &OrderPayload) -> Result<StockChange> {
        self.apply_movement(order, MovementKind::Reserve).await
    }

    /// Credits stock for an order once. A repeated call for the same order is
    /// a no-op.
    #[tracing::instrument(skip_all, fields(order_id = %order.id, product_id = %order.product_id))]
    pub async fn release_for_order(&self, order: &OrderPayload) -> Result<StockChange> {
        self.apply_movement(order, MovementKind::Release).await
    }

    async fn apply_movement(&self, order: &OrderPayload, kind: MovementKind) -> Result<StockChange> {
        let change = self
            .store
            .update(|doc| -> Result<Change<StockChange>> {
                if doc.has_movement(order.id, kind) {
                    return Ok(Change::Unchanged(StockChange::AlreadyApplied));
                }
                let product = doc.product_mut(order.product_id)?;
                let stock = match kind {
                    MovementKind::Reserve => debit(product, order.quantity)?,
                    MovementKind::Release => credit(product, order.quantity),
                };
                doc.movements.push(Movement {
                    order_id: order.id,
                    kind,
                    product_id: order.product_id,
                    quantity: order.quantity,
                });
                doc.prune_movements(self.retention);
                Ok(Change::Modified(StockChange::Applied { stock }))
            })
            .await?;

        if let StockChange::Applied { stock } = change {
            info!(?kind, quantity = order.quantity, stock, "Stock updated");
        }
        Ok(change)
    }
}

#[async_trait]
impl StockCatalog for InventoryStore {
    async fn products(&self) -> Result<Vec<Product>> {
        self.list_stock().await
    }

    async fn product(&self, id: ProductId) -> Result<Product> {
        self.get_product(id).await
    }
}
