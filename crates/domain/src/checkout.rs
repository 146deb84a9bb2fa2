//! Checkout: converts a user's open cart into an order in one transaction.

use std::time::{Duration, Instant};

use common::{Money, UserId};
use store::{
    CartStore, CatalogReader, NewOrder, NewOrderItem, Order, OrderStore, StockLedger, Store,
    StoreTransaction,
};

use crate::error::DomainError;

/// Service that places orders from open carts.
///
/// A checkout either commits completely or leaves no trace:
/// the order and its lines are written, stock is decremented for every line,
/// and the cart is closed, all inside a single store transaction.
#[derive(Debug, Clone)]
pub struct CheckoutService<S: Store> {
    store: S,
    timeout: Option<Duration>,
}

impl<S: Store> CheckoutService<S> {
    /// Creates a checkout service with no deadline.
    pub fn new(store: S) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Sets the deadline for a single checkout.
    ///
    /// The deadline covers opening the transaction and placing the order.
    /// When it elapses the transaction is rolled back and the caller
    /// receives [`DomainError::TimedOut`]. The commit itself is not cut
    /// short, so a reported timeout always means nothing was written.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks out the user's open cart.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, user_id: UserId) -> Result<Order, DomainError> {
        let start = Instant::now();
        metrics::counter!("checkout_attempts_total").increment(1);

        let result = self.run(user_id).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    total = %order.total,
                    lines = order.items.len(),
                    "Checkout completed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total", "reason" => e.reason()).increment(1);
                tracing::warn!(error = %e, "Checkout failed");
            }
        }

        result
    }

    async fn run(&self, user_id: UserId) -> Result<Order, DomainError> {
        let deadline = self
            .timeout
            .map(|limit| tokio::time::Instant::now() + limit);

        let mut tx = before(deadline, async {
            self.store.begin().await.map_err(DomainError::from)
        })
        .await?;

        match before(deadline, place_order(&mut tx, user_id)).await {
            Ok(order) => {
                tx.commit().await?;
                Ok(order)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, "Checkout rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// Runs `work`, failing with [`DomainError::TimedOut`] once `deadline` passes.
async fn before<T, F>(
    deadline: Option<tokio::time::Instant>,
    work: F,
) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, DomainError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, work)
            .await
            .unwrap_or(Err(DomainError::TimedOut)),
        None => work.await,
    }
}

async fn place_order<T: StoreTransaction>(
    tx: &mut T,
    user_id: UserId,
) -> Result<Order, DomainError> {
    let cart = tx
        .open_cart(user_id)
        .await?
        .ok_or(DomainError::NoOpenCart)?;

    let lines = tx.checkout_lines(cart.id).await?;

    if let Some(short) = lines.iter().find(|l| l.stock < l.quantity) {
        return Err(DomainError::InsufficientStock {
            product_id: short.product_id,
            requested: short.quantity,
            available: short.stock,
        });
    }
    if lines.is_empty() {
        return Err(DomainError::EmptyCart);
    }

    let total = lines
        .iter()
        .try_fold(Money::zero(), |total, l| {
            l.unit_price
                .checked_multiply(l.quantity)
                .and_then(|line| total.checked_add(line))
        })
        .ok_or_else(|| DomainError::Validation("order total is out of range".to_string()))?;

    let order = tx
        .create_order(NewOrder {
            user_id,
            total,
            items: lines
                .iter()
                .map(|l| NewOrderItem {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                })
                .collect(),
        })
        .await?;

    for line in &lines {
        if !tx.decrement_stock(line.product_id, line.quantity).await? {
            let available = tx
                .stock_and_price(line.product_id)
                .await?
                .map_or(0, |current| current.stock);
            return Err(DomainError::InsufficientStock {
                product_id: line.product_id,
                requested: line.quantity,
                available,
            });
        }
    }

    tx.mark_ordered(cart.id).await?;

    Ok(order)
}
