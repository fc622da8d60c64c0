//! Order record as kept by the ledger.

use common::{ClientId, OrderId, OrderPayload, OrderStatus, ProductId};
use serde::{Deserialize, Serialize};

use super::OrderError;

/// Request to create an order.
///
/// `quantity` is kept signed so a negative value from the caller is
/// rejected here rather than silently wrapped by the decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub client_id: ClientId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
}

impl NewOrder {
    /// Returns the quantity as an unsigned count, or an error if it is not
    /// strictly positive.
    pub fn validated_quantity(&self) -> Result<u32, OrderError> {
        match u32::try_from(self.quantity) {
            Ok(quantity) if quantity > 0 => Ok(quantity),
            _ => Err(OrderError::InvalidQuantity {
                quantity: self.quantity,
            }),
        }
    }
}

/// A single order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub client_id: ClientId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    #[serde(default)]
    pub status: OrderStatus,
}

impl Order {
    /// Builds a fresh pending order from a validated request.
    pub fn pending(id: OrderId, request: NewOrder, quantity: u32) -> Self {
        Self {
            id,
            client_id: request.client_id,
            product_id: request.product_id,
            product_name: request.product_name,
            quantity,
            status: OrderStatus::Pending,
        }
    }

    /// Rebuilds an order from an event payload, taking the payload's status.
    pub fn from_payload(payload: &OrderPayload) -> Self {
        Self {
            id: payload.id,
            client_id: payload.client_id,
            product_id: payload.product_id,
            product_name: payload.product_name.clone(),
            quantity: payload.quantity,
            status: payload.status,
        }
    }

    /// Snapshot of this order with the given status, ready to publish.
    pub fn to_payload(&self, status: OrderStatus) -> OrderPayload {
        OrderPayload {
            id: self.id,
            client_id: self.client_id,
            product_id: self.product_id,
            product_name: self.product_name.clone(),
            quantity: self.quantity,
            status,
        }
    }
}
