//! Persisted order document and its id sequence.

use common::OrderId;
use serde::{Deserialize, Serialize};

use super::Order;

/// Monotonic order id source stored next to the orders it numbered.
///
/// Ids start at 1 and are never reused, even if an id was seen only
/// through a reconciled event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceGenerator {
    last_issued: u64,
}

impl SequenceGenerator {
    /// Issues the next id.
    pub fn next(&mut self) -> OrderId {
        self.last_issued += 1;
        OrderId::new(self.last_issued)
    }

    /// Records an id assigned elsewhere so it is never issued again.
    pub fn observe(&mut self, id: OrderId) {
        self.last_issued = self.last_issued.max(id.value());
    }

    pub fn last_issued(&self) -> u64 {
        self.last_issued
    }
}

/// The ledger's whole store: every order plus the id sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBook {
    #[serde(default)]
    pub sequence: SequenceGenerator,
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl OrderBook {
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|order| order.id == id)
    }

    pub fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.iter_mut().find(|order| order.id == id)
    }

    /// Issues an id that is above both the sequence and every stored order.
    pub fn next_id(&mut self) -> OrderId {
        if let Some(max) = self.orders.iter().map(|order| order.id).max() {
            self.sequence.observe(max);
        }
        self.sequence.next()
    }
}
