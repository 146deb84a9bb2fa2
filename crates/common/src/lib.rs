//! Shared types used across the commerce crates.

mod ids;
mod money;

pub use ids::{CartId, CartItemId, OrderId, OrderItemId, ProductId, UserId};
pub use money::Money;
