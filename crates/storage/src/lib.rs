//! Local persistence for the order saga services.
//!
//! Each service owns one JSON document per store (orders, cart, stock). A
//! document is read fully before every mutation and rewritten fully after it.
//! [`GuardedStore`] serializes those read-modify-write cycles.

pub mod error;
pub mod guarded;
pub mod json_file;
pub mod memory;
pub mod store;

pub use error::{Result, StoreError};
pub use guarded::{Change, GuardedStore};
pub use json_file::JsonFileStore;
pub use memory::InMemoryDocumentStore;
pub use store::DocumentStore;
