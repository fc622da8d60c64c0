//! Domain layer of the order ledger (the order-facing front door).
//!
//! This crate provides:
//! - [`Order`] records and the [`OrderBook`] document they live in
//! - [`OrderLedger`]: create, cancel, list, get, and fold terminal events
//!   back into local records
//! - [`CartService`]: the pre-order cart keyed by `(client, product)`

pub mod cart;
pub mod error;
pub mod order;

pub use cart::{AddToCart, CartError, CartItem, CartService};
pub use error::{DomainError, Result};
pub use order::{
    FoldOutcome, NewOrder, Order, OrderBook, OrderError, OrderLedger, OrderStatus,
    SequenceGenerator,
};
