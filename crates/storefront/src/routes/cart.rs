//! Cart route handlers.
//!
//! Carts are addressed by `cart_id` in the request; anonymous clients keep
//! the id themselves, optionally alongside a `session_token`.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aurora_core::{CartId, CustomerId, ProductId, Quantity, QuantityUpdate, VariantId};

use crate::error::{AppError, Result};
use crate::models::{CartView, ItemRef};
use crate::routes::{ApiJson, ApiQuery};
use crate::services::cart::AddItem;
use crate::state::AppState;

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub cart_id: Option<CartId>,
    pub variant_id: Option<VariantId>,
    pub product_id: Option<ProductId>,
    #[serde(alias = "quantity")]
    pub qty: f64,
    pub customer_id: Option<CustomerId>,
    pub session_token: Option<String>,
}

/// Set-quantity request body.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub cart_id: CartId,
    pub variant_id: VariantId,
    #[serde(alias = "quantity")]
    pub qty: f64,
}

/// Remove-line or clear-cart request body.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub cart_id: CartId,
    pub variant_id: Option<VariantId>,
    #[serde(default)]
    pub clear: bool,
}

/// Query parameters for reading a cart.
#[derive(Debug, Deserialize)]
pub struct CartQuery {
    pub cart_id: CartId,
}

/// Response naming the cart that was touched.
#[derive(Debug, Serialize)]
pub struct CartIdResponse {
    pub cart_id: CartId,
}

/// Add a line or increase an existing one.
#[instrument(skip(state, body), fields(cart_id = ?body.cart_id))]
pub async fn add(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AddToCartRequest>,
) -> Result<Json<CartIdResponse>> {
    let item = ItemRef::from_parts(body.variant_id, body.product_id).ok_or_else(|| {
        AppError::InvalidInput("variant_id or product_id is required".to_string())
    })?;
    let quantity =
        Quantity::from_f64(body.qty).map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let cart_id = state
        .carts()
        .add_item(AddItem {
            cart_id: body.cart_id,
            item,
            quantity,
            customer_id: body.customer_id,
            session_token: body.session_token,
        })
        .await?;

    Ok(Json(CartIdResponse { cart_id }))
}

/// Replace a line's quantity; zero or less removes the line.
#[instrument(skip(state, body), fields(cart_id = %body.cart_id, variant_id = %body.variant_id))]
pub async fn update(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UpdateCartRequest>,
) -> Result<Json<CartIdResponse>> {
    let update =
        QuantityUpdate::from_f64(body.qty).map_err(|e| AppError::InvalidInput(e.to_string()))?;

    state
        .carts()
        .set_item_qty(body.cart_id, body.variant_id, update)
        .await?;

    Ok(Json(CartIdResponse {
        cart_id: body.cart_id,
    }))
}

/// Remove one line, or every line when `clear` is set.
///
/// Removing something that is already gone still succeeds.
#[instrument(skip(state, body), fields(cart_id = %body.cart_id))]
pub async fn remove(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RemoveFromCartRequest>,
) -> Result<Json<CartIdResponse>> {
    let carts = state.carts();
    let removed = match (body.clear, body.variant_id) {
        (true, _) => carts.clear_cart(body.cart_id).await?,
        (false, Some(variant_id)) => carts.remove_item(body.cart_id, variant_id).await?,
        (false, None) => {
            return Err(AppError::InvalidInput(
                "variant_id is required unless clear is set".to_string(),
            ));
        }
    };
    tracing::debug!(removed, "cart delete applied");

    Ok(Json(CartIdResponse {
        cart_id: body.cart_id,
    }))
}

/// Read a cart with its lines and subtotal.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CartQuery>,
) -> Result<Json<CartView>> {
    let cart = state.carts().get_cart(query.cart_id).await?;
    Ok(Json(cart))
}
