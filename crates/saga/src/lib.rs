//! Choreography participants of the order saga.
//!
//! No participant calls another. Each one reacts to bus events, changes its
//! own local state and may publish further events:
//!
//! | Participant | Consumes | Publishes |
//! |---|---|---|
//! | Inventory | `order.created`, `order.cancelled` | nothing |
//! | Payment | `order.created` | `payment.approved` / `payment.declined` |
//! | Delivery | `payment.approved` | `order.shipped` |
//! | Notification | `#` | nothing (push stream) |
//! | Order ledger | `payment.approved`, `payment.declined`, `order.shipped` | nothing |

pub mod error;
pub mod handlers;
pub mod runtime;
pub mod services;

pub use error::{InventoryError, PaymentError, Result, SagaError};
pub use runtime::{Participants, Services, Settings};
pub use services::{
    AuthorizationRequest, DeliveryDispatcher, HttpPaymentGateway, InMemoryPaymentGateway,
    InventoryStore, Notification, NotificationRelay, PaymentAuthority, PaymentGateway, Product,
    SimulatedPaymentGateway, StockCatalog, StockChange, StockDocument, Verdict,
};
