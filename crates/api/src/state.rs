//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use domain::{CartService, CheckoutService, IdentityResolver, OrderService};
use store::Store;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub carts: CartService<S>,
    pub checkout: CheckoutService<S>,
    pub orders: OrderService<S>,
    pub identity: Arc<dyn IdentityResolver>,
}

impl<S: Store> AppState<S> {
    /// Wires the services over one store.
    pub fn new(
        store: S,
        identity: Arc<dyn IdentityResolver>,
        checkout_timeout: Option<Duration>,
    ) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            checkout: CheckoutService::new(store.clone()).with_timeout(checkout_timeout),
            orders: OrderService::new(store),
            identity,
        }
    }
}
