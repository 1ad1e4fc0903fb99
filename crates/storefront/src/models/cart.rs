//! Cart read models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use aurora_core::{CartId, CartStatus, CustomerId, ProductId, Quantity, VariantId};

/// Stored cart header.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Cart {
    pub cart_id: CartId,
    pub customer_id: Option<CustomerId>,
    pub session_token: Option<String>,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cart header as returned to clients.
///
/// A cart that does not exist is returned as `{cart_id}` alone.
#[derive(Debug, Clone, Serialize)]
pub struct CartHeader {
    pub cart_id: CartId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CartStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartHeader {
    /// Header for a cart id with no stored row.
    #[must_use]
    pub const fn stub(cart_id: CartId) -> Self {
        Self {
            cart_id,
            customer_id: None,
            status: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl From<Cart> for CartHeader {
    fn from(cart: Cart) -> Self {
        // session_token is a client credential and is never echoed back
        Self {
            cart_id: cart.cart_id,
            customer_id: cart.customer_id,
            status: Some(cart.status),
            created_at: Some(cart.created_at),
            updated_at: Some(cart.updated_at),
        }
    }
}

/// A cart line joined with its variant and product title.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub product_title: String,
    pub sku: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub unit_price: Decimal,
    pub currency: String,
    pub quantity: Quantity,
    pub line_total: Decimal,
}

/// Response body of `GET /cart`.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart: CartHeader,
    pub items: Vec<CartLine>,
    pub subtotal: Decimal,
}

impl CartView {
    /// Build a view, computing the subtotal from the lines.
    #[must_use]
    pub fn new(cart: CartHeader, items: Vec<CartLine>) -> Self {
        let subtotal = items.iter().map(|line| line.line_total).sum();
        Self {
            cart,
            items,
            subtotal,
        }
    }
}
