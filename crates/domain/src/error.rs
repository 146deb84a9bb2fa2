//! Domain error types.

use common::ProductId;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
///
/// Business failures are values; only [`DomainError::Storage`] reflects an
/// infrastructure fault.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input failed validation before touching the store.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced resource does not exist (or is not visible to the user).
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: i64 },

    /// Not enough stock to satisfy a cart line.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Checkout was attempted on a cart with no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Checkout was attempted without an open cart.
    #[error("No open cart")]
    NoOpenCart,

    /// The credential could not be resolved to a user.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// An error occurred in the store.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// The operation did not finish within its deadline and was rolled back.
    #[error("Operation timed out")]
    TimedOut,
}

impl DomainError {
    /// Short label used for the `reason` metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation",
            DomainError::NotFound { .. } => "not_found",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::EmptyCart => "empty_cart",
            DomainError::NoOpenCart => "no_open_cart",
            DomainError::Unauthenticated(_) => "unauthenticated",
            DomainError::Storage(_) => "storage",
            DomainError::TimedOut => "timed_out",
        }
    }
}
