//! Rows persisted by the store.

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, Money, OrderId, OrderItemId, ProductId, UserId};

use crate::StoreError;

/// Largest quantity a single cart or order line can hold.
pub const MAX_LINE_QUANTITY: u32 = i32::MAX as u32;

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub price: Money,
    pub stock: u32,
}

/// Current price and stock of a product, as seen by the catalog reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockAndPrice {
    pub price: Money,
    pub stock: u32,
}

/// Lifecycle of a cart.
///
/// ```text
/// Open ──► Ordered
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CartStatus {
    /// The user is still adding items.
    #[default]
    Open,

    /// Checked out; the cart is never reopened (terminal state).
    Ordered,
}

impl CartStatus {
    /// Returns the value stored in the `carts.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Open => "open",
            CartStatus::Ordered => "ordered",
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CartStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(CartStatus::Open),
            "ordered" => Ok(CartStatus::Ordered),
            other => Err(StoreError::Decode(format!("unknown cart status '{other}'"))),
        }
    }
}

/// A user's shopping cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line in a cart, joined with its product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price captured when the product was added.
    pub unit_price: Money,
    pub product_name: String,
    pub product_slug: String,
    /// Current stock of the product, not reserved by this line.
    pub stock: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// Returns `unit_price * quantity`.
    pub fn line_total(&self) -> Money {
        self.unit_price.saturating_multiply(self.quantity)
    }
}

/// A product/quantity/price triple to merge into a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewCartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A cart line joined with the product's current stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub stock: u32,
}

/// Status of a placed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderStatus {
    #[default]
    Created,
}

impl OrderStatus {
    /// Returns the value stored in the `orders.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(OrderStatus::Created),
            other => Err(StoreError::Decode(format!("unknown order status '{other}'"))),
        }
    }
}

/// An immutable order with its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// A line in an order.
///
/// Order lines do not hold a foreign key to the catalog, so the product
/// name and slug are absent once the product row is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub product_name: Option<String>,
    pub product_slug: Option<String>,
}

impl OrderItem {
    /// Returns `unit_price * quantity`.
    pub fn line_total(&self) -> Money {
        self.unit_price.saturating_multiply(self.quantity)
    }
}

/// An order to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total: Money,
    pub items: Vec<NewOrderItem>,
}

/// A line of an order to append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}
