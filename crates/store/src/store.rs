use async_trait::async_trait;
use common::{CartId, OrderId, ProductId, UserId};

use crate::{
    Cart, CartItem, CheckoutLine, NewCartItem, NewOrder, Order, Result, StockAndPrice,
};

/// Read-only lookup of product price and stock.
#[async_trait]
pub trait CatalogReader: Send {
    /// Returns the product's current price and stock, or None if it doesn't exist.
    async fn stock_and_price(&mut self, product_id: ProductId) -> Result<Option<StockAndPrice>>;
}

/// Persistence for per-user carts and their lines.
#[async_trait]
pub trait CartStore: Send {
    /// Returns the user's most recently created open cart, locking it for the
    /// rest of the transaction.
    async fn open_cart(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Returns the user's open cart, creating one if none exists.
    ///
    /// Concurrent callers converge on a single cart.
    async fn get_or_create_open_cart(&mut self, user_id: UserId) -> Result<Cart>;

    /// Merges a line into the cart.
    ///
    /// An existing `(cart, product)` line has its quantity increased and its
    /// unit price overwritten; otherwise a new line is inserted.
    async fn add_item(&mut self, cart_id: CartId, item: NewCartItem) -> Result<CartItem>;

    /// Lists the cart's lines, most recently created first.
    async fn items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>>;

    /// Loads the cart's lines together with each product's current stock,
    /// locking the product rows in product id order.
    async fn checkout_lines(&mut self, cart_id: CartId) -> Result<Vec<CheckoutLine>>;

    /// Marks the cart as ordered and deletes its lines.
    async fn mark_ordered(&mut self, cart_id: CartId) -> Result<()>;
}

/// Append-only persistence for orders.
#[async_trait]
pub trait OrderStore: Send {
    /// Appends an order and its lines.
    async fn create_order(&mut self, order: NewOrder) -> Result<Order>;

    /// Lists the user's orders, newest first, each with its lines.
    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>>;

    /// Returns a single order if it belongs to the user.
    async fn order_for_user(&mut self, user_id: UserId, order_id: OrderId)
    -> Result<Option<Order>>;
}

/// Stock mutation used by checkout.
#[async_trait]
pub trait StockLedger: Send {
    /// Decrements stock if at least `quantity` units remain.
    ///
    /// Returns false, leaving stock untouched, when the guard fails.
    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<bool>;
}

/// A unit of work spanning every store component.
///
/// Dropping a transaction without committing discards all of its writes.
#[async_trait]
pub trait StoreTransaction:
    CatalogReader + CartStore + OrderStore + StockLedger + Send + 'static
{
    /// Makes all writes of the transaction durable.
    async fn commit(self) -> Result<()>;

    /// Discards all writes of the transaction.
    async fn rollback(self) -> Result<()>;
}

/// Core trait for store implementations.
///
/// A store hands out transactions; all reads and writes go through one.
/// Implementations must be cheap to clone and thread-safe.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    /// The transaction type handed out by [`Store::begin`].
    type Transaction: StoreTransaction;

    /// Starts a new transaction.
    async fn begin(&self) -> Result<Self::Transaction>;
}
