use serde::{Deserialize, Serialize};

/// Declares a strongly-typed wrapper around a database row identifier.
///
/// Identifiers are positive integers assigned by the store; wrapping them
/// prevents passing a cart id where a product id is expected.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw identifier.
            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Returns true if the identifier could refer to a stored row.
            pub const fn is_valid(&self) -> bool {
                self.0 > 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

row_id!(
    /// Identifier of an authenticated user, as resolved from a session token.
    UserId
);
row_id!(
    /// Catalog product identifier.
    ProductId
);
row_id!(
    /// Shopping cart identifier.
    CartId
);
row_id!(
    /// Cart line identifier.
    CartItemId
);
row_id!(
    /// Order identifier.
    OrderId
);
row_id!(
    /// Order line identifier.
    OrderItemId
);
