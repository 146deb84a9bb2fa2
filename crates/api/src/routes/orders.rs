//! Checkout and order history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::Serialize;
use store::{Order, Store};

use super::LineItemResponse;
use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

// -- Response types --

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    pub total_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<LineItemResponse>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            total_cents: order.total.cents(),
            status: order.status.to_string(),
            created_at: order.created_at,
            items: order.items.iter().map(LineItemResponse::from).collect(),
        }
    }
}

// -- Handlers --

/// POST /orders/checkout — turn the caller's open cart into an order.
#[tracing::instrument(skip(state))]
pub async fn checkout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let order = state.checkout.checkout(user_id).await?;

    let response = CheckoutResponse {
        order_id: order.id,
        total_cents: order.total.cents(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders — the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_orders(user_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id} — one of the caller's orders.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.get_order(user_id, OrderId::new(id)).await?;
    Ok(Json(OrderResponse::from(&order)))
}
