//! Order history.

use common::{OrderId, UserId};
use store::{Order, OrderStore, Store, StoreTransaction};

use crate::error::DomainError;

/// Read access to a user's placed orders.
#[derive(Debug, Clone)]
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lists the user's orders, newest first, each with its lines.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<Order>, DomainError> {
        let mut tx = self.store.begin().await?;
        let orders = tx.orders_for_user(user_id).await?;
        tx.commit().await?;
        Ok(orders)
    }

    /// Loads one of the user's orders.
    ///
    /// Orders belonging to other users are reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order, DomainError> {
        let mut tx = self.store.begin().await?;
        let order = tx.order_for_user(user_id, order_id).await?;
        tx.commit().await?;

        order.ok_or(DomainError::NotFound {
            resource: "order",
            id: order_id.get(),
        })
    }
}
