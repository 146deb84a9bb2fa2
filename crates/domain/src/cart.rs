//! Cart service: the per-user open cart and its lines.

use common::{CartId, ProductId, UserId};
use store::{
    Cart, CartItem, CartStore, CatalogReader, MAX_LINE_QUANTITY, NewCartItem, Store,
    StoreTransaction,
};

use crate::error::DomainError;

/// A user's open cart as returned to callers.
///
/// `cart_id` is `None` when the user has no open cart; `items` is then empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    pub cart_id: Option<CartId>,
    pub items: Vec<CartItem>,
}

impl CartView {
    fn empty() -> Self {
        Self {
            cart_id: None,
            items: Vec::new(),
        }
    }
}

/// Service for managing carts.
///
/// Every operation runs in its own store transaction.
#[derive(Debug, Clone)]
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    /// Creates a new cart service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's open cart, if any.
    #[tracing::instrument(skip(self))]
    pub async fn get_open_cart(&self, user_id: UserId) -> Result<Option<Cart>, DomainError> {
        let mut tx = self.store.begin().await?;
        let cart = tx.open_cart(user_id).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Returns the user's open cart, creating it on first use.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create_open_cart(&self, user_id: UserId) -> Result<Cart, DomainError> {
        let mut tx = self.store.begin().await?;
        let cart = tx.get_or_create_open_cart(user_id).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Adds `quantity` units of a product to the user's open cart.
    ///
    /// The line is priced at the product's current catalog price. Stock is
    /// checked against the requested quantity but not reserved; checkout
    /// re-validates it. The merged line must stay within
    /// [`MAX_LINE_QUANTITY`] and its total within the range of [`common::Money`].
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartView, DomainError> {
        if !product_id.is_valid() {
            return Err(DomainError::Validation(format!(
                "product_id must be a positive integer, got {product_id}"
            )));
        }
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "quantity must be a positive integer, got {quantity}"
                ))
            })?;

        let mut tx = self.store.begin().await?;
        let cart = tx.get_or_create_open_cart(user_id).await?;

        let current = tx
            .stock_and_price(product_id)
            .await?
            .ok_or(DomainError::NotFound {
                resource: "product",
                id: product_id.get(),
            })?;

        if current.stock < quantity {
            return Err(DomainError::InsufficientStock {
                product_id,
                requested: quantity,
                available: current.stock,
            });
        }

        let in_cart = tx
            .items(cart.id)
            .await?
            .iter()
            .find(|i| i.product_id == product_id)
            .map_or(0, |i| i.quantity);
        let merged = in_cart
            .checked_add(quantity)
            .filter(|q| *q <= MAX_LINE_QUANTITY)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "cart quantity for product {product_id} cannot exceed {MAX_LINE_QUANTITY}"
                ))
            })?;
        if current.price.checked_multiply(merged).is_none() {
            return Err(DomainError::Validation(format!(
                "line total for product {product_id} is out of range"
            )));
        }

        tx.add_item(
            cart.id,
            NewCartItem {
                product_id,
                quantity,
                unit_price: current.price,
            },
        )
        .await?;
        let items = tx.items(cart.id).await?;
        tx.commit().await?;

        metrics::counter!("cart_items_added_total").increment(u64::from(quantity));
        tracing::debug!(cart_id = %cart.id, %product_id, quantity, "Item added to cart");

        Ok(CartView {
            cart_id: Some(cart.id),
            items,
        })
    }

    /// Lists a cart's lines, most recently added first.
    #[tracing::instrument(skip(self))]
    pub async fn list_items(&self, cart_id: CartId) -> Result<Vec<CartItem>, DomainError> {
        let mut tx = self.store.begin().await?;
        let items = tx.items(cart_id).await?;
        tx.commit().await?;
        Ok(items)
    }

    /// Returns the user's open cart with its lines.
    ///
    /// A user without an open cart gets an empty view, not an error.
    #[tracing::instrument(skip(self))]
    pub async fn cart(&self, user_id: UserId) -> Result<CartView, DomainError> {
        let mut tx = self.store.begin().await?;
        let view = match tx.open_cart(user_id).await? {
            Some(cart) => CartView {
                cart_id: Some(cart.id),
                items: tx.items(cart.id).await?,
            },
            None => CartView::empty(),
        };
        tx.commit().await?;
        Ok(view)
    }
}
