//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use common::{CartId, ProductId};
use domain::CartView;
use serde::{Deserialize, Serialize};
use store::Store;

use super::LineItemResponse;
use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: i64,
    pub quantity: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart_id: Option<CartId>,
    pub items: Vec<LineItemResponse>,
}

impl From<CartView> for CartResponse {
    fn from(view: CartView) -> Self {
        Self {
            cart_id: view.cart_id,
            items: view.items.iter().map(LineItemResponse::from).collect(),
        }
    }
}

/// POST /cart/items — add a product to the caller's open cart.
#[tracing::instrument(skip(state, payload))]
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    payload: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<Json<CartResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let view = state
        .carts
        .add_to_cart(
            user_id,
            ProductId::new(req.product_id),
            req.quantity.unwrap_or(1),
        )
        .await?;

    Ok(Json(view.into()))
}

/// GET /cart — the caller's open cart, or an empty one.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<CartResponse>, ApiError> {
    let view = state.carts.cart(user_id).await?;
    Ok(Json(view.into()))
}
