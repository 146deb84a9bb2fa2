pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;

use common::ProductId;
use serde::Serialize;

/// A cart or order line as returned over HTTP.
///
/// `name` and `slug` are null on order lines whose product no longer
/// exists. `stock` is the product's current stock and is only present on
/// cart lines.
#[derive(Debug, Serialize)]
pub struct LineItemResponse {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

impl From<&store::CartItem> for LineItemResponse {
    fn from(item: &store::CartItem) -> Self {
        Self {
            product_id: item.product_id,
            name: Some(item.product_name.clone()),
            slug: Some(item.product_slug.clone()),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            line_total_cents: item.line_total().cents(),
            stock: Some(item.stock),
        }
    }
}

impl From<&store::OrderItem> for LineItemResponse {
    fn from(item: &store::OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.product_name.clone(),
            slug: item.product_slug.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            line_total_cents: item.line_total().cents(),
            stock: None,
        }
    }
}
