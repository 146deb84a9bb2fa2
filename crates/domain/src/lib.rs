//! Domain layer for the commerce backend.
//!
//! This crate provides the services behind the HTTP surface:
//! - [`CartService`] for the per-user open cart
//! - [`CheckoutService`] for the atomic cart-to-order transaction
//! - [`OrderService`] for order history
//! - [`IdentityResolver`] and [`SignedTokenResolver`] for bearer tokens

pub mod cart;
pub mod checkout;
pub mod error;
pub mod identity;
pub mod orders;

pub use cart::{CartService, CartView};
pub use checkout::CheckoutService;
pub use error::DomainError;
pub use identity::{IdentityResolver, SignedTokenResolver};
pub use orders::OrderService;
