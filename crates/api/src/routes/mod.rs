pub mod cart;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod system;
