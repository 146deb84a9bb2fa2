use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, CartItemId, Money, OrderId, OrderItemId, ProductId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Cart, CartItem, CartStatus, CheckoutLine, MAX_LINE_QUANTITY, NewCartItem, NewOrder, Order,
    OrderItem, OrderStatus, Product, Result, StockAndPrice, StoreError,
    store::{CartStore, CatalogReader, OrderStore, StockLedger, Store, StoreTransaction},
};

/// Points at which the in-memory store can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    CreateOrder,
    DecrementStock,
    MarkOrdered,
}

impl FaultPoint {
    fn as_str(&self) -> &'static str {
        match self {
            FaultPoint::CreateOrder => "create_order",
            FaultPoint::DecrementStock => "decrement_stock",
            FaultPoint::MarkOrdered => "mark_ordered",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Sequences {
    product: i64,
    cart: i64,
    cart_item: i64,
    order: i64,
    order_item: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

/// Complete contents of an in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub products: BTreeMap<ProductId, Product>,
    pub carts: BTreeMap<CartId, Cart>,
    pub cart_items: BTreeMap<CartItemId, CartItem>,
    pub orders: BTreeMap<OrderId, Order>,
    sequences: Sequences,
}

#[derive(Debug, Default)]
struct MemoryState {
    data: StoreSnapshot,
    fault: Option<FaultPoint>,
    commit_delay: Option<Duration>,
}

/// In-memory store implementation for testing.
///
/// A transaction holds an exclusive lock on the whole store and works on a
/// copy of its contents; committing swaps the copy in. Transactions are
/// therefore fully serialized.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product to the catalog.
    pub async fn insert_product(
        &self,
        name: impl Into<String>,
        price: Money,
        stock: u32,
    ) -> Product {
        let mut state = self.state.lock().await;
        let name = name.into();
        let product = Product {
            id: ProductId::new(next(&mut state.data.sequences.product)),
            slug: name.to_lowercase().replace(' ', "-"),
            name,
            price,
            stock,
        };
        state.data.products.insert(product.id, product.clone());
        product
    }

    /// Returns a product by ID.
    pub async fn product(&self, product_id: ProductId) -> Option<Product> {
        self.state.lock().await.data.products.get(&product_id).cloned()
    }

    /// Returns a copy of everything stored.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.state.lock().await.data.clone()
    }

    /// Makes every transaction fail when it reaches the given point.
    pub async fn set_fault(&self, fault: Option<FaultPoint>) {
        self.state.lock().await.fault = fault;
    }

    /// Makes every commit wait before publishing its writes.
    pub async fn set_commit_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.commit_delay = delay;
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.data.clone();
        let fault = guard.fault;
        let commit_delay = guard.commit_delay;
        Ok(InMemoryTransaction {
            guard,
            working,
            fault,
            commit_delay,
        })
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: StoreSnapshot,
    fault: Option<FaultPoint>,
    commit_delay: Option<Duration>,
}

impl InMemoryTransaction {
    fn check_fault(&self, point: FaultPoint) -> Result<()> {
        if self.fault == Some(point) {
            return Err(StoreError::InjectedFault(point.as_str()));
        }
        Ok(())
    }

    fn find_open_cart(&self, user_id: UserId) -> Option<&Cart> {
        self.working
            .carts
            .values()
            .filter(|c| c.user_id == user_id && c.status == CartStatus::Open)
            .max_by_key(|c| c.id)
    }

    /// Refreshes the product columns of a cart line from the catalog.
    fn joined(&self, mut item: CartItem) -> CartItem {
        if let Some(product) = self.working.products.get(&item.product_id) {
            item.product_name = product.name.clone();
            item.product_slug = product.slug.clone();
            item.stock = product.stock;
        }
        item
    }
}

#[async_trait]
impl CatalogReader for InMemoryTransaction {
    async fn stock_and_price(&mut self, product_id: ProductId) -> Result<Option<StockAndPrice>> {
        Ok(self
            .working
            .products
            .get(&product_id)
            .map(|p| StockAndPrice {
                price: p.price,
                stock: p.stock,
            }))
    }
}

#[async_trait]
impl CartStore for InMemoryTransaction {
    async fn open_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.find_open_cart(user_id).cloned())
    }

    async fn get_or_create_open_cart(&mut self, user_id: UserId) -> Result<Cart> {
        if let Some(cart) = self.find_open_cart(user_id) {
            return Ok(cart.clone());
        }

        let now = Utc::now();
        let cart = Cart {
            id: CartId::new(next(&mut self.working.sequences.cart)),
            user_id,
            status: CartStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.working.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn add_item(&mut self, cart_id: CartId, item: NewCartItem) -> Result<CartItem> {
        if !self.working.carts.contains_key(&cart_id) {
            return Err(StoreError::Conflict(format!("cart {cart_id} does not exist")));
        }
        let Some(product) = self.working.products.get(&item.product_id) else {
            return Err(StoreError::Conflict(format!(
                "product {} does not exist",
                item.product_id
            )));
        };
        let (product_name, product_slug, stock) =
            (product.name.clone(), product.slug.clone(), product.stock);

        let now = Utc::now();
        let existing = self
            .working
            .cart_items
            .values_mut()
            .find(|i| i.cart_id == cart_id && i.product_id == item.product_id);

        if let Some(line) = existing {
            line.quantity = line
                .quantity
                .checked_add(item.quantity)
                .filter(|q| *q <= MAX_LINE_QUANTITY)
                .ok_or_else(|| {
                    StoreError::Decode(format!(
                        "quantity of cart item {} exceeds column range",
                        line.id
                    ))
                })?;
            line.unit_price = item.unit_price;
            line.updated_at = now;
            let line = line.clone();
            return Ok(self.joined(line));
        }

        if item.quantity > MAX_LINE_QUANTITY {
            return Err(StoreError::Decode(format!(
                "quantity {} exceeds column range",
                item.quantity
            )));
        }

        let line = CartItem {
            id: CartItemId::new(next(&mut self.working.sequences.cart_item)),
            cart_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            product_name,
            product_slug,
            stock,
            created_at: now,
            updated_at: now,
        };
        self.working.cart_items.insert(line.id, line.clone());
        Ok(line)
    }

    async fn items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>> {
        Ok(self
            .working
            .cart_items
            .values()
            .rev()
            .filter(|i| i.cart_id == cart_id)
            .map(|i| self.joined(i.clone()))
            .collect())
    }

    async fn checkout_lines(&mut self, cart_id: CartId) -> Result<Vec<CheckoutLine>> {
        let mut lines = self
            .working
            .cart_items
            .values()
            .filter(|i| i.cart_id == cart_id)
            .map(|i| -> Result<CheckoutLine> {
                let product = self.working.products.get(&i.product_id).ok_or_else(|| {
                    StoreError::Decode(format!(
                        "cart item {} references missing product {}",
                        i.id, i.product_id
                    ))
                })?;
                Ok(CheckoutLine {
                    product_id: i.product_id,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    stock: product.stock,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        lines.sort_by_key(|l| l.product_id);
        Ok(lines)
    }

    async fn mark_ordered(&mut self, cart_id: CartId) -> Result<()> {
        self.check_fault(FaultPoint::MarkOrdered)?;

        let cart = self
            .working
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::Conflict(format!("cart {cart_id} does not exist")))?;
        cart.status = CartStatus::Ordered;
        cart.updated_at = Utc::now();

        self.working.cart_items.retain(|_, i| i.cart_id != cart_id);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryTransaction {
    async fn create_order(&mut self, order: NewOrder) -> Result<Order> {
        self.check_fault(FaultPoint::CreateOrder)?;

        let order_id = OrderId::new(next(&mut self.working.sequences.order));
        let mut items = Vec::with_capacity(order.items.len());
        for item in order.items {
            let product = self.working.products.get(&item.product_id);
            items.push(OrderItem {
                id: OrderItemId::new(next(&mut self.working.sequences.order_item)),
                order_id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                product_name: product.map(|p| p.name.clone()),
                product_slug: product.map(|p| p.slug.clone()),
            });
        }

        let created = Order {
            id: order_id,
            user_id: order.user_id,
            total: order.total,
            status: OrderStatus::Created,
            created_at: Utc::now(),
            items,
        };
        self.working.orders.insert(order_id, created.clone());
        Ok(created)
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn order_for_user(
        &mut self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .get(&order_id)
            .filter(|o| o.user_id == user_id)
            .cloned())
    }
}

#[async_trait]
impl StockLedger for InMemoryTransaction {
    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<bool> {
        self.check_fault(FaultPoint::DecrementStock)?;

        match self.working.products.get_mut(&product_id) {
            Some(product) if product.stock >= quantity => {
                product.stock -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn commit(self) -> Result<()> {
        let Self {
            mut guard,
            working,
            commit_delay,
            ..
        } = self;
        if let Some(delay) = commit_delay {
            tokio::time::sleep(delay).await;
        }
        guard.data = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: ProductId, quantity: u32, cents: i64) -> NewCartItem {
        NewCartItem {
            product_id,
            quantity,
            unit_price: Money::from_cents(cents),
        }
    }

    #[tokio::test]
    async fn get_or_create_open_cart_is_idempotent() {
        let store = InMemoryStore::new();
        let user = UserId::new(1);

        let mut tx = store.begin().await.unwrap();
        let first = tx.get_or_create_open_cart(user).await.unwrap();
        let second = tx.get_or_create_open_cart(user).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.snapshot().await.carts.len(), 1);
    }

    #[tokio::test]
    async fn add_item_merges_quantity_and_overwrites_price() {
        let store = InMemoryStore::new();
        let product = store
            .insert_product("Widget", Money::from_cents(1000), 10)
            .await;

        let mut tx = store.begin().await.unwrap();
        let cart = tx.get_or_create_open_cart(UserId::new(1)).await.unwrap();
        tx.add_item(cart.id, line(product.id, 2, 1000)).await.unwrap();
        let merged = tx.add_item(cart.id, line(product.id, 3, 1200)).await.unwrap();
        let items = tx.items(cart.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(merged.quantity, 5);
        assert_eq!(merged.unit_price, Money::from_cents(1200));
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn add_item_rejects_merged_quantity_beyond_column_range() {
        let store = InMemoryStore::new();
        let product = store
            .insert_product("Widget", Money::from_cents(1), 4_000_000_000)
            .await;

        let mut tx = store.begin().await.unwrap();
        let cart = tx.get_or_create_open_cart(UserId::new(1)).await.unwrap();
        tx.add_item(cart.id, line(product.id, 2_000_000_000, 1))
            .await
            .unwrap();
        let result = tx.add_item(cart.id, line(product.id, 2_000_000_000, 1)).await;
        let items = tx.items(cart.id).await.unwrap();

        assert!(matches!(result, Err(StoreError::Decode(_))));
        assert_eq!(items[0].quantity, 2_000_000_000);
    }

    #[tokio::test]
    async fn items_carry_product_name_slug_and_current_stock() {
        let store = InMemoryStore::new();
        let product = store
            .insert_product("Blue Widget", Money::from_cents(100), 7)
            .await;

        let mut tx = store.begin().await.unwrap();
        let cart = tx.get_or_create_open_cart(UserId::new(1)).await.unwrap();
        tx.add_item(cart.id, line(product.id, 2, 100)).await.unwrap();
        assert!(tx.decrement_stock(product.id, 3).await.unwrap());
        let items = tx.items(cart.id).await.unwrap();

        assert_eq!(items[0].product_name, "Blue Widget");
        assert_eq!(items[0].product_slug, "blue-widget");
        assert_eq!(items[0].stock, 4);
    }

    #[tokio::test]
    async fn items_are_listed_most_recent_first() {
        let store = InMemoryStore::new();
        let a = store.insert_product("A", Money::from_cents(100), 5).await;
        let b = store.insert_product("B", Money::from_cents(200), 5).await;

        let mut tx = store.begin().await.unwrap();
        let cart = tx.get_or_create_open_cart(UserId::new(1)).await.unwrap();
        tx.add_item(cart.id, line(a.id, 1, 100)).await.unwrap();
        tx.add_item(cart.id, line(b.id, 1, 200)).await.unwrap();
        let items = tx.items(cart.id).await.unwrap();

        assert_eq!(items[0].product_id, b.id);
        assert_eq!(items[1].product_id, a.id);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();
        let before = store.snapshot().await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.get_or_create_open_cart(UserId::new(1)).await.unwrap();
        }

        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn decrement_stock_refuses_to_go_negative() {
        let store = InMemoryStore::new();
        let product = store.insert_product("Widget", Money::from_cents(100), 2).await;

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.decrement_stock(product.id, 3).await.unwrap());
        assert!(tx.decrement_stock(product.id, 2).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.product(product.id).await.unwrap().stock, 0);
    }

    #[tokio::test]
    async fn mark_ordered_closes_cart_and_clears_items() {
        let store = InMemoryStore::new();
        let user = UserId::new(1);
        let product = store.insert_product("Widget", Money::from_cents(100), 2).await;

        let mut tx = store.begin().await.unwrap();
        let cart = tx.get_or_create_open_cart(user).await.unwrap();
        tx.add_item(cart.id, line(product.id, 1, 100)).await.unwrap();
        tx.mark_ordered(cart.id).await.unwrap();

        assert!(tx.open_cart(user).await.unwrap().is_none());
        assert!(tx.items(cart.id).await.unwrap().is_empty());

        let next_cart = tx.get_or_create_open_cart(user).await.unwrap();
        assert_ne!(next_cart.id, cart.id);
    }

    #[tokio::test]
    async fn orders_are_listed_newest_first_per_user() {
        let store = InMemoryStore::new();
        let user = UserId::new(1);

        let mut tx = store.begin().await.unwrap();
        for total in [100, 200] {
            tx.create_order(NewOrder {
                user_id: user,
                total: Money::from_cents(total),
                items: vec![],
            })
            .await
            .unwrap();
        }
        tx.create_order(NewOrder {
            user_id: UserId::new(2),
            total: Money::from_cents(300),
            items: vec![],
        })
        .await
        .unwrap();

        let orders = tx.orders_for_user(user).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].total, Money::from_cents(200));
        assert!(orders[0].items.is_empty());
        assert_eq!(orders[1].total, Money::from_cents(100));

        let foreign = orders[0].id;
        assert!(
            tx.order_for_user(UserId::new(2), foreign)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn injected_fault_fails_the_operation() {
        let store = InMemoryStore::new();
        store.set_fault(Some(FaultPoint::CreateOrder)).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx
            .create_order(NewOrder {
                user_id: UserId::new(1),
                total: Money::zero(),
                items: vec![],
            })
            .await;

        assert!(matches!(
            result,
            Err(StoreError::InjectedFault("create_order"))
        ));
    }
}
