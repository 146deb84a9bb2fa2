//! Integration tests for the cart-to-order flow.
//!
//! These tests run the domain services against the in-memory store and check
//! the all-or-nothing behaviour of checkout, including under concurrency.

use std::time::Duration;

use common::{Money, ProductId, UserId};
use domain::{CartService, CheckoutService, DomainError, OrderService};
use futures_util::future::join_all;
use store::{CartStatus, FaultPoint, InMemoryStore, Product};

struct Fixture {
    store: InMemoryStore,
    carts: CartService<InMemoryStore>,
    checkout: CheckoutService<InMemoryStore>,
    orders: OrderService<InMemoryStore>,
}

fn fixture() -> Fixture {
    let store = InMemoryStore::new();
    Fixture {
        carts: CartService::new(store.clone()),
        checkout: CheckoutService::new(store.clone()),
        orders: OrderService::new(store.clone()),
        store,
    }
}

impl Fixture {
    async fn product(&self, name: &str, cents: i64, stock: u32) -> Product {
        self.store
            .insert_product(name, Money::from_cents(cents), stock)
            .await
    }

    async fn stock(&self, product_id: ProductId) -> u32 {
        self.store.product(product_id).await.unwrap().stock
    }
}

mod cart_behaviour {
    use super::*;

    #[tokio::test]
    async fn repeated_adds_merge_into_one_line() {
        let f = fixture();
        let product = f.product("Mug", 800, 20).await;
        let user = UserId::new(1);

        for quantity in [1, 2, 3] {
            f.carts.add_to_cart(user, product.id, quantity).await.unwrap();
        }

        let view = f.carts.cart(user).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].quantity, 6);
        assert_eq!(f.store.snapshot().await.cart_items.len(), 1);
    }

    #[tokio::test]
    async fn listed_items_carry_captured_price() {
        let f = fixture();
        let user = UserId::new(1);
        let product = f.product("Mug", 800, 20).await;
        f.carts.add_to_cart(user, product.id, 1).await.unwrap();

        let cart = f.carts.get_open_cart(user).await.unwrap().unwrap();
        let items = f.carts.list_items(cart.id).await.unwrap();
        assert_eq!(items[0].unit_price, Money::from_cents(800));
    }

    #[tokio::test]
    async fn add_to_cart_does_not_reserve_stock() {
        let f = fixture();
        let product = f.product("Mug", 800, 2).await;

        f.carts
            .add_to_cart(UserId::new(1), product.id, 2)
            .await
            .unwrap();
        f.carts
            .add_to_cart(UserId::new(2), product.id, 2)
            .await
            .unwrap();

        assert_eq!(f.stock(product.id).await, 2);
    }

    #[tokio::test]
    async fn one_open_cart_per_user() {
        let f = fixture();
        let user = UserId::new(1);

        let first = f.carts.get_or_create_open_cart(user).await.unwrap();
        let second = f.carts.get_or_create_open_cart(user).await.unwrap();

        assert_eq!(first.id, second.id);
        let open = f
            .store
            .snapshot()
            .await
            .carts
            .values()
            .filter(|c| c.user_id == user && c.status == CartStatus::Open)
            .count();
        assert_eq!(open, 1);
    }
}

mod checkout_success {
    use super::*;

    #[tokio::test]
    async fn checkout_converts_cart_into_order() {
        let f = fixture();
        let product = f.product("Widget", 1000, 5).await;
        let user = UserId::new(1);
        f.carts.add_to_cart(user, product.id, 3).await.unwrap();
        let cart = f.carts.get_open_cart(user).await.unwrap().unwrap();

        let order = f.checkout.checkout(user).await.unwrap();

        assert_eq!(order.total, Money::from_cents(3000));
        assert_eq!(order.total.to_string(), "$30.00");
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 3);
        assert_eq!(order.items[0].unit_price, Money::from_cents(1000));
        assert_eq!(f.stock(product.id).await, 2);

        let snapshot = f.store.snapshot().await;
        assert_eq!(snapshot.carts[&cart.id].status, CartStatus::Ordered);
        assert!(snapshot.cart_items.is_empty());
        assert!(f.carts.get_open_cart(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stock_decrease_matches_ordered_quantity() {
        let f = fixture();
        let a = f.product("A", 100, 10).await;
        let b = f.product("B", 200, 7).await;
        let user = UserId::new(1);
        f.carts.add_to_cart(user, a.id, 4).await.unwrap();
        f.carts.add_to_cart(user, b.id, 7).await.unwrap();

        let order = f.checkout.checkout(user).await.unwrap();

        let ordered: u32 = order.items.iter().map(|i| i.quantity).sum();
        let decreased = (10 - f.stock(a.id).await) + (7 - f.stock(b.id).await);
        assert_eq!(ordered, decreased);
        assert_eq!(order.total, Money::from_cents(1800));
    }

    #[tokio::test]
    async fn order_uses_price_captured_in_cart() {
        let f = fixture();
        let product = f.product("Widget", 1000, 5).await;
        let user = UserId::new(1);
        f.carts.add_to_cart(user, product.id, 1).await.unwrap();

        let order = f.checkout.checkout(user).await.unwrap();

        assert_eq!(order.items[0].line_total(), Money::from_cents(1000));
    }

    #[tokio::test]
    async fn order_lines_carry_product_name_and_slug() {
        let f = fixture();
        let product = f.product("Steel Widget", 1000, 5).await;
        let user = UserId::new(1);
        f.carts.add_to_cart(user, product.id, 1).await.unwrap();

        let order = f.checkout.checkout(user).await.unwrap();
        let fetched = f.orders.get_order(user, order.id).await.unwrap();

        assert_eq!(fetched.items[0].product_name.as_deref(), Some("Steel Widget"));
        assert_eq!(fetched.items[0].product_slug.as_deref(), Some("steel-widget"));
    }

    #[tokio::test]
    async fn next_add_after_checkout_opens_new_cart() {
        let f = fixture();
        let product = f.product("Widget", 1000, 5).await;
        let user = UserId::new(1);
        let first = f.carts.add_to_cart(user, product.id, 1).await.unwrap();
        f.checkout.checkout(user).await.unwrap();

        let second = f.carts.add_to_cart(user, product.id, 1).await.unwrap();

        assert_ne!(first.cart_id, second.cart_id);
    }

    #[tokio::test]
    async fn orders_are_listed_newest_first() {
        let f = fixture();
        let product = f.product("Widget", 100, 10).await;
        let user = UserId::new(1);

        let mut placed = Vec::new();
        for quantity in [1, 2] {
            f.carts.add_to_cart(user, product.id, quantity).await.unwrap();
            placed.push(f.checkout.checkout(user).await.unwrap());
        }

        let orders = f.orders.list_orders(user).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, placed[1].id);
        assert_eq!(orders[1].id, placed[0].id);

        let single = f.orders.get_order(user, placed[0].id).await.unwrap();
        assert_eq!(single, placed[0]);
    }

    #[tokio::test]
    async fn other_users_orders_are_not_found() {
        let f = fixture();
        let product = f.product("Widget", 100, 10).await;
        f.carts
            .add_to_cart(UserId::new(1), product.id, 1)
            .await
            .unwrap();
        let order = f.checkout.checkout(UserId::new(1)).await.unwrap();

        let result = f.orders.get_order(UserId::new(2), order.id).await;

        assert!(matches!(
            result,
            Err(DomainError::NotFound {
                resource: "order",
                ..
            })
        ));
        assert!(f.orders.list_orders(UserId::new(2)).await.unwrap().is_empty());
    }
}

mod checkout_failures {
    use super::*;

    #[tokio::test]
    async fn no_open_cart() {
        let f = fixture();

        let result = f.checkout.checkout(UserId::new(1)).await;

        assert!(matches!(result, Err(DomainError::NoOpenCart)));
    }

    #[tokio::test]
    async fn empty_cart_creates_no_order() {
        let f = fixture();
        let user = UserId::new(1);
        f.carts.get_or_create_open_cart(user).await.unwrap();

        let result = f.checkout.checkout(user).await;

        assert!(matches!(result, Err(DomainError::EmptyCart)));
        assert!(f.store.snapshot().await.orders.is_empty());
        assert!(f.carts.get_open_cart(user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_state_untouched() {
        let f = fixture();
        let product = f.product("Widget", 1000, 5).await;
        let user = UserId::new(1);
        f.carts.add_to_cart(user, product.id, 3).await.unwrap();

        // Another shopper buys most of the stock first.
        f.carts
            .add_to_cart(UserId::new(2), product.id, 4)
            .await
            .unwrap();
        f.checkout.checkout(UserId::new(2)).await.unwrap();

        let before = f.store.snapshot().await;
        let result = f.checkout.checkout(user).await;

        assert!(matches!(
            result,
            Err(DomainError::InsufficientStock {
                requested: 3,
                available: 1,
                ..
            })
        ));
        assert_eq!(f.store.snapshot().await, before);
    }

    #[tokio::test]
    async fn injected_failures_roll_back_everything() {
        for fault in [
            FaultPoint::CreateOrder,
            FaultPoint::DecrementStock,
            FaultPoint::MarkOrdered,
        ] {
            let f = fixture();
            let a = f.product("A", 100, 5).await;
            let b = f.product("B", 300, 5).await;
            let user = UserId::new(1);
            f.carts.add_to_cart(user, a.id, 2).await.unwrap();
            f.carts.add_to_cart(user, b.id, 1).await.unwrap();

            let before = f.store.snapshot().await;
            f.store.set_fault(Some(fault)).await;

            let result = f.checkout.checkout(user).await;

            assert!(
                matches!(result, Err(DomainError::Storage(_))),
                "{fault:?}: expected Storage error, got {result:?}"
            );
            assert_eq!(f.store.snapshot().await, before, "{fault:?}");
        }
    }

    #[tokio::test]
    async fn timeout_rolls_back_and_reports() {
        let store = InMemoryStore::new();
        let product = store
            .insert_product("Widget", Money::from_cents(100), 5)
            .await;
        let user = UserId::new(1);
        CartService::new(store.clone())
            .add_to_cart(user, product.id, 1)
            .await
            .unwrap();
        let before = store.snapshot().await;

        let checkout =
            CheckoutService::new(store.clone()).with_timeout(Some(Duration::from_millis(50)));

        // Hold the store so the checkout cannot make progress.
        let blocker = store::Store::begin(&store).await.unwrap();
        let result = checkout.checkout(user).await;
        drop(blocker);

        assert!(matches!(result, Err(DomainError::TimedOut)));
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn checkout_finishing_within_deadline_commits() {
        let store = InMemoryStore::new();
        let product = store
            .insert_product("Widget", Money::from_cents(100), 5)
            .await;
        let user = UserId::new(1);
        let added = CartService::new(store.clone())
            .add_to_cart(user, product.id, 2)
            .await
            .unwrap();
        // Commit outlasts the deadline; only the work before it is bounded.
        store
            .set_commit_delay(Some(Duration::from_millis(150)))
            .await;

        let order = CheckoutService::new(store.clone())
            .with_timeout(Some(Duration::from_millis(100)))
            .checkout(user)
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.orders[&order.id].items[0].quantity, 2);
        let cart_id = added.cart_id.unwrap();
        assert_eq!(snapshot.carts[&cart_id].status, CartStatus::Ordered);
        assert_eq!(snapshot.products[&product.id].stock, 3);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_never_oversell() {
        let f = fixture();
        let product = f.product("Widget", 500, 3).await;
        let buyers = [UserId::new(1), UserId::new(2)];
        for user in buyers {
            f.carts.add_to_cart(user, product.id, 3).await.unwrap();
        }

        let results = join_all(buyers.map(|user| {
            let checkout = f.checkout.clone();
            tokio::spawn(async move { checkout.checkout(user).await })
        }))
        .await;
        let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(DomainError::InsufficientStock { .. })))
            .count();
        assert_eq!(succeeded, 1);
        assert_eq!(short, 1);
        assert_eq!(f.stock(product.id).await, 0);
        assert_eq!(f.store.snapshot().await.orders.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_buyers_consume_exactly_the_stock() {
        let f = fixture();
        let product = f.product("Widget", 100, 10).await;
        let buyers: Vec<_> = (1..=25).map(UserId::new).collect();
        for user in &buyers {
            f.carts.add_to_cart(*user, product.id, 1).await.unwrap();
        }

        let results = join_all(buyers.iter().map(|user| {
            let checkout = f.checkout.clone();
            let user = *user;
            tokio::spawn(async move { checkout.checkout(user).await })
        }))
        .await;

        let succeeded = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(succeeded, 10);
        assert_eq!(f.stock(product.id).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn double_checkout_of_same_cart_places_one_order() {
        let f = fixture();
        let product = f.product("Widget", 100, 10).await;
        let user = UserId::new(1);
        f.carts.add_to_cart(user, product.id, 2).await.unwrap();

        let results = join_all((0..2).map(|_| {
            let checkout = f.checkout.clone();
            tokio::spawn(async move { checkout.checkout(user).await })
        }))
        .await;

        let outcomes: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| matches!(r, Err(DomainError::NoOpenCart)))
        );
        assert_eq!(f.stock(product.id).await, 8);
    }
}
