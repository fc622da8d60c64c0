//! Wire payload shared by every order event.

use serde::{Deserialize, Serialize};

use crate::{ClientId, OrderId, OrderStatus, ProductId};

/// Order snapshot carried by every event on the bus.
///
/// Serialized as `{"id", "clientId", "productId", "productName", "quantity", "status"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub id: OrderId,
    pub client_id: ClientId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub status: OrderStatus,
}

impl OrderPayload {
    /// Returns a copy of this snapshot carrying a different status.
    pub fn with_status(&self, status: OrderStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Parses a payload out of a raw JSON value.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Converts this payload into a JSON value.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
