use std::collections::HashMap;

use async_trait::async_trait;
use common::{CartId, CartItemId, Money, OrderId, OrderItemId, ProductId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};

use crate::{
    Cart, CartItem, CheckoutLine, NewCartItem, NewOrder, Order, OrderItem, Result,
    StockAndPrice, StoreError,
    store::{CartStore, CatalogReader, OrderStore, StockLedger, Store, StoreTransaction},
};

const CART_COLUMNS: &str = "id, user_id, status, created_at, updated_at";
const CART_ITEM_COLUMNS: &str = "ci.id, ci.cart_id, ci.product_id, ci.quantity, \
    ci.unit_price_cents, ci.created_at, ci.updated_at, \
    p.name AS product_name, p.slug AS product_slug, p.stock";
const ORDER_ITEM_COLUMNS: &str = "oi.id, oi.order_id, oi.product_id, oi.quantity, \
    oi.unit_price_cents, p.name AS product_name, p.slug AS product_slug";

/// PostgreSQL-backed store implementation.
///
/// Carts are locked with `SELECT ... FOR UPDATE` when read inside a
/// transaction, and product rows are locked in id order during checkout, so
/// concurrent checkouts touching the same products are serialized.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to the given database.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// Transaction over a [`PostgresStore`].
///
/// Dropping it without committing rolls the database transaction back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

fn count(row: &PgRow, col: &str) -> Result<u32> {
    let value: i32 = row.try_get(col)?;
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("{col} is negative: {value}")))
}

fn to_column(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Decode(format!("{value} exceeds column range")))
}

fn row_to_cart(row: PgRow) -> Result<Cart> {
    let status: String = row.try_get("status")?;
    Ok(Cart {
        id: CartId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_item(row: PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::new(row.try_get("id")?),
        cart_id: CartId::new(row.try_get("cart_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: count(&row, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        product_name: row.try_get("product_name")?,
        product_slug: row.try_get("product_slug")?,
        stock: count(&row, "stock")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        total: Money::from_cents(row.try_get("total_cents")?),
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        items: Vec::new(),
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: count(row, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        product_name: row.try_get("product_name")?,
        product_slug: row.try_get("product_slug")?,
    })
}

impl PostgresTransaction {
    /// Attaches order lines to already-loaded orders.
    async fn load_items(&mut self, orders: &mut [Order]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = orders.iter().map(|o| o.id.get()).collect();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_ITEM_COLUMNS}
            FROM order_items oi
            LEFT JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = ANY($1)
            ORDER BY oi.id ASC
            "#
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let item = row_to_order_item(row)?;
            by_order.entry(item.order_id).or_default().push(item);
        }

        for order in orders.iter_mut() {
            order.items = by_order.remove(&order.id).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogReader for PostgresTransaction {
    async fn stock_and_price(&mut self, product_id: ProductId) -> Result<Option<StockAndPrice>> {
        let row: Option<PgRow> = sqlx::query("SELECT price_cents, stock FROM products WHERE id = $1")
            .bind(product_id.get())
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(Some(StockAndPrice {
                price: Money::from_cents(row.try_get("price_cents")?),
                stock: count(&row, "stock")?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CartStore for PostgresTransaction {
    async fn open_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            r#"
            SELECT {CART_COLUMNS}
            FROM carts
            WHERE user_id = $1 AND status = 'open'
            ORDER BY id DESC
            LIMIT 1
            FOR UPDATE
            "#
        ))
        .bind(user_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_cart).transpose()
    }

    async fn get_or_create_open_cart(&mut self, user_id: UserId) -> Result<Cart> {
        if let Some(cart) = self.open_cart(user_id).await? {
            return Ok(cart);
        }

        // Blocks on a concurrent insert for the same user until it resolves.
        let inserted: Option<PgRow> = sqlx::query(&format!(
            r#"
            INSERT INTO carts (user_id, status)
            VALUES ($1, 'open')
            ON CONFLICT (user_id) WHERE status = 'open' DO NOTHING
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(user_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = inserted {
            let cart = row_to_cart(row)?;
            tracing::debug!(cart_id = %cart.id, %user_id, "Opened cart");
            return Ok(cart);
        }

        self.open_cart(user_id).await?.ok_or_else(|| {
            StoreError::Conflict(format!("open cart for user {user_id} could not be created"))
        })
    }

    async fn add_item(&mut self, cart_id: CartId, item: NewCartItem) -> Result<CartItem> {
        let row = sqlx::query(&format!(
            r#"
            WITH upserted AS (
                INSERT INTO cart_items (cart_id, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (cart_id, product_id) DO UPDATE SET
                    quantity = cart_items.quantity + EXCLUDED.quantity,
                    unit_price_cents = EXCLUDED.unit_price_cents,
                    updated_at = NOW()
                RETURNING *
            )
            SELECT {CART_ITEM_COLUMNS}
            FROM upserted ci
            JOIN products p ON p.id = ci.product_id
            "#
        ))
        .bind(cart_id.get())
        .bind(item.product_id.get())
        .bind(to_column(item.quantity)?)
        .bind(item.unit_price.cents())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_cart_item(row)
    }

    async fn items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CART_ITEM_COLUMNS}
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.id DESC
            "#
        ))
        .bind(cart_id.get())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_cart_item).collect()
    }

    async fn checkout_lines(&mut self, cart_id: CartId) -> Result<Vec<CheckoutLine>> {
        let rows = sqlx::query(
            r#"
            SELECT ci.product_id, ci.quantity, ci.unit_price_cents, p.stock
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.product_id ASC
            FOR UPDATE OF p
            "#,
        )
        .bind(cart_id.get())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| -> Result<CheckoutLine> {
                Ok(CheckoutLine {
                    product_id: ProductId::new(row.try_get("product_id")?),
                    quantity: count(row, "quantity")?,
                    unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
                    stock: count(row, "stock")?,
                })
            })
            .collect()
    }

    async fn mark_ordered(&mut self, cart_id: CartId) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE carts SET status = 'ordered', updated_at = NOW() WHERE id = $1 AND status = 'open'",
        )
        .bind(cart_id.get())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::Conflict(format!("cart {cart_id} is not open")));
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.get())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresTransaction {
    async fn create_order(&mut self, order: NewOrder) -> Result<Order> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders (user_id, total_cents, status)
            VALUES ($1, $2, 'created')
            RETURNING id, user_id, total_cents, status, created_at
            "#,
        )
        .bind(order.user_id.get())
        .bind(order.total.cents())
        .fetch_one(&mut *self.tx)
        .await?;

        let mut created = row_to_order(&row)?;

        for item in order.items {
            let row = sqlx::query(&format!(
                r#"
                WITH inserted AS (
                    INSERT INTO order_items (order_id, product_id, quantity, unit_price_cents)
                    VALUES ($1, $2, $3, $4)
                    RETURNING *
                )
                SELECT {ORDER_ITEM_COLUMNS}
                FROM inserted oi
                LEFT JOIN products p ON p.id = oi.product_id
                "#
            ))
            .bind(created.id.get())
            .bind(item.product_id.get())
            .bind(to_column(item.quantity)?)
            .bind(item.unit_price.cents())
            .fetch_one(&mut *self.tx)
            .await?;

            created.items.push(row_to_order_item(&row)?);
        }

        Ok(created)
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, total_cents, status, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY id DESC
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&mut *self.tx)
        .await?;

        let mut orders = rows.iter().map(row_to_order).collect::<Result<Vec<_>>>()?;
        self.load_items(&mut orders).await?;
        Ok(orders)
    }

    async fn order_for_user(
        &mut self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, user_id, total_cents, status, created_at
            FROM orders
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(order_id.get())
        .bind(user_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut orders = vec![row_to_order(&row)?];
        self.load_items(&mut orders).await?;
        Ok(orders.pop())
    }
}

#[async_trait]
impl StockLedger for PostgresTransaction {
    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<bool> {
        let quantity = to_column(quantity)?;
        let updated = sqlx::query(
            "UPDATE products SET stock = stock - $1 WHERE id = $2 AND stock >= $1",
        )
        .bind(quantity)
        .bind(product_id.get())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tracing::debug!(%product_id, quantity, "Stock decrement guard failed");
        }
        Ok(updated == 1)
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
