use serde::{Deserialize, Serialize};

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw integer identifier.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw integer value.
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

integer_id!(
    /// Identity of an order, assigned by the order ledger.
    ///
    /// Ids are monotonically increasing within one ledger instance.
    OrderId
);

integer_id!(
    /// Identity of the client placing orders.
    ClientId
);

integer_id!(
    /// Identity of a product, unique within the inventory store.
    ProductId
);

impl OrderId {
    /// Returns the id that follows this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}
