//! Pre-order cart, kept by the order ledger.

use common::{ClientId, ProductId};
use serde::{Deserialize, Serialize};
use storage::{Change, DocumentStore, GuardedStore};
use thiserror::Error;
use tracing::info;

use crate::error::{DomainError, Result};

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    #[error("Cart item not found: client {client_id}, product {product_id}")]
    ItemNotFound {
        client_id: ClientId,
        product_id: ProductId,
    },
}

/// A line in a client's cart. `(client_id, product_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub client_id: ClientId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
}

/// Request to put a product in a cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub client_id: ClientId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
}

fn positive_quantity(quantity: i64) -> std::result::Result<u32, CartError> {
    match u32::try_from(quantity) {
        Ok(q) if q > 0 => Ok(q),
        _ => Err(CartError::InvalidQuantity { quantity }),
    }
}

fn position(items: &[CartItem], client_id: ClientId, product_id: ProductId) -> Option<usize> {
    items
        .iter()
        .position(|item| item.client_id == client_id && item.product_id == product_id)
}

#[derive(Clone)]
pub struct CartService {
    store: GuardedStore<Vec<CartItem>>,
}

impl CartService {
    pub fn new(store: impl DocumentStore<Vec<CartItem>> + 'static) -> Self {
        Self {
            store: GuardedStore::new(store),
        }
    }

    pub async fn list(&self) -> Result<Vec<CartItem>> {
        Ok(self.store.read().await?)
    }

    pub async fn list_for_client(&self, client_id: ClientId) -> Result<Vec<CartItem>> {
        let items = self.store.read().await?;
        Ok(items
            .into_iter()
            .filter(|item| item.client_id == client_id)
            .collect())
    }

    /// Adds a product to the cart. Adding a product that is already there
    /// increases its quantity.
    #[tracing::instrument(skip(self, request), fields(client_id = %request.client_id, product_id = %request.product_id))]
    pub async fn add(&self, request: AddToCart) -> Result<CartItem> {
        let quantity = positive_quantity(request.quantity)?;
        let item = self
            .store
            .update(|items| {
                let item = match position(items, request.client_id, request.product_id) {
                    Some(index) => {
                        let existing = &mut items[index];
                        existing.quantity = existing.quantity.saturating_add(quantity);
                        existing.clone()
                    }
                    None => {
                        let item = CartItem {
                            client_id: request.client_id,
                            product_id: request.product_id,
                            product_name: request.product_name,
                            quantity,
                        };
                        items.push(item.clone());
                        item
                    }
                };
                Ok::<_, DomainError>(Change::Modified(item))
            })
            .await?;
        info!(quantity = item.quantity, "Cart item added");
        Ok(item)
    }

    /// Replaces the quantity of an existing cart line.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        client_id: ClientId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartItem> {
        let quantity = positive_quantity(quantity)?;
        self.store
            .update(|items| -> Result<Change<CartItem>> {
                let index = position(items, client_id, product_id).ok_or(
                    CartError::ItemNotFound {
                        client_id,
                        product_id,
                    },
                )?;
                items[index].quantity = quantity;
                Ok(Change::Modified(items[index].clone()))
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, client_id: ClientId, product_id: ProductId) -> Result<CartItem> {
        self.store
            .update(|items| -> Result<Change<CartItem>> {
                let index = position(items, client_id, product_id).ok_or(
                    CartError::ItemNotFound {
                        client_id,
                        product_id,
                    },
                )?;
                Ok(Change::Modified(items.remove(index)))
            })
            .await
    }
}
