//! Persistence for the commerce backend.
//!
//! All access goes through a [`StoreTransaction`] obtained from a [`Store`].
//! Two backends are provided:
//! - [`InMemoryStore`] for tests and local runs
//! - [`PostgresStore`] backed by a connection pool

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{FaultPoint, InMemoryStore, StoreSnapshot};
pub use model::{
    Cart, CartItem, CartStatus, CheckoutLine, NewCartItem, NewOrder, NewOrderItem, Order,
    OrderItem, OrderStatus, Product, StockAndPrice, MAX_LINE_QUANTITY,
};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{CartStore, CatalogReader, OrderStore, StockLedger, Store, StoreTransaction};
