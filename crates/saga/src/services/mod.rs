//! Saga participants and the collaborators they depend on.

pub mod delivery;
pub mod inventory;
pub mod notification;
pub mod payment;

pub use delivery::DeliveryDispatcher;
pub use inventory::{
    DEFAULT_MOVEMENT_RETENTION, InventoryStore, Movement, MovementKind, Product, StockCatalog,
    StockChange, StockDocument,
};
pub use notification::{Notification, NotificationRelay};
pub use payment::{
    AuthorizationRequest, DEFAULT_VERDICT_CAPACITY, HttpPaymentGateway, InMemoryPaymentGateway,
    PaymentAuthority, PaymentGateway, SimulatedPaymentGateway, Verdict, transaction_reference,
};
