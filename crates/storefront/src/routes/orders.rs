//! Order route handlers.

use axum::{Json, extract::State, http::StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aurora_core::{CartId, Email, OrderId, ProductId, Quantity, VariantId, validate_amount};

use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{AddressInput, ItemRef, OrderDetail};
use crate::routes::{ApiJson, ApiPath};
use crate::services::orders::{Checkout, CheckoutCustomer, CheckoutLine};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Checkout request body.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub cart_id: Option<CartId>,
    pub customer: CustomerPayload,
    pub items: Vec<ItemPayload>,
    pub pricing: PricingPayload,
    pub notes: Option<String>,
    pub payment: Option<PaymentPayload>,
}

/// Buyer details.
#[derive(Debug, Deserialize)]
pub struct CustomerPayload {
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub address: AddressInput,
}

/// One requested line.
#[derive(Debug, Deserialize)]
pub struct ItemPayload {
    pub variant_id: Option<VariantId>,
    pub product_id: Option<ProductId>,
    #[serde(alias = "qty")]
    pub quantity: f64,
    #[serde(alias = "price")]
    pub unit_price: Option<Decimal>,
}

/// Amounts the client charged. Only `total` is checked; the rest is display.
#[derive(Debug, Deserialize)]
pub struct PricingPayload {
    pub total: Decimal,
}

/// Payment confirmation.
#[derive(Debug, Deserialize)]
pub struct PaymentPayload {
    pub transaction_id: Option<String>,
}

/// Response for a created order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: OrderId,
}

// =============================================================================
// Validation
// =============================================================================

/// Validate a checkout body without touching storage.
fn build_checkout(body: CreateOrderRequest) -> Result<Checkout> {
    let email = body
        .customer
        .email
        .as_deref()
        .filter(|email| !email.trim().is_empty())
        .map(Email::parse)
        .transpose()
        .map_err(|e| AppError::InvalidInput(format!("customer.email: {e}")))?;

    let missing = body.customer.address.missing_fields();
    if !missing.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "customer.address is missing: {}",
            missing.join(", ")
        )));
    }

    if body.items.is_empty() {
        return Err(AppError::InvalidInput("items must not be empty".to_string()));
    }

    let items = body
        .items
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            let item = ItemRef::from_parts(line.variant_id, line.product_id).ok_or_else(|| {
                AppError::InvalidInput(format!("items[{index}] needs variant_id or product_id"))
            })?;
            let quantity = Quantity::from_f64(line.quantity)
                .map_err(|e| AppError::InvalidInput(format!("items[{index}].quantity: {e}")))?;
            Ok(CheckoutLine {
                item,
                quantity,
                unit_price_hint: line.unit_price,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let total = validate_amount(body.pricing.total)
        .map_err(|e| AppError::InvalidInput(format!("pricing.total: {e}")))?;

    Ok(Checkout {
        customer: CheckoutCustomer {
            email,
            first_name: body.customer.first_name,
            last_name: body.customer.last_name,
            address: body.customer.address,
        },
        items,
        total,
        notes: body.notes.filter(|notes| !notes.trim().is_empty()),
        transaction_id: body
            .payment
            .and_then(|payment| payment.transaction_id)
            .filter(|id| !id.trim().is_empty()),
        cart_id: body.cart_id,
    })
}

// =============================================================================
// Handlers
// =============================================================================

/// Materialize a paid checkout into an order.
#[instrument(skip(state, principal, body))]
pub async fn create(
    State(state): State<AppState>,
    OptionalAuth(principal): OptionalAuth,
    ApiJson(body): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreated>)> {
    let checkout = build_checkout(body)?;
    let order_id = state
        .orders()
        .create_order(principal.as_ref(), checkout)
        .await?;

    Ok((StatusCode::CREATED, Json(OrderCreated { order_id })))
}

/// Read one of the principal's orders.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(order_id): ApiPath<OrderId>,
) -> Result<Json<OrderDetail>> {
    let order = state.orders().get_order(&user, order_id).await?;
    Ok(Json(order))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> CreateOrderRequest {
        serde_json::from_value(json).unwrap()
    }

    fn valid() -> serde_json::Value {
        serde_json::json!({
            "customer": {
                "email": "Buyer@Example.com",
                "first_name": "Ada",
                "last_name": "Lovelace",
                "address": {
                    "line1": "1 Analytical Way",
                    "city": "London",
                    "region": "LDN",
                    "postal_code": "N1 9GU"
                }
            },
            "items": [
                { "variant_id": "6f9619ff-8b86-d011-b42d-00c04fc964ff", "qty": 2, "price": "25.00" }
            ],
            "pricing": { "total": 55.5, "shipping": 5.5 },
            "payment": { "transaction_id": "pi_123" }
        })
    }

    #[test]
    fn test_build_checkout_accepts_valid_body() {
        let checkout = build_checkout(request(valid())).unwrap();

        assert_eq!(checkout.customer.email.unwrap().as_str(), "buyer@example.com");
        assert_eq!(checkout.items.len(), 1);
        assert_eq!(checkout.items[0].quantity.get(), 2);
        assert_eq!(checkout.total, Decimal::new(5550, 2));
        assert_eq!(checkout.transaction_id.as_deref(), Some("pi_123"));
    }

    #[test]
    fn test_build_checkout_rejects_empty_items() {
        let mut body = valid();
        body["items"] = serde_json::json!([]);
        assert!(matches!(
            build_checkout(request(body)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_build_checkout_rejects_line_without_reference() {
        let mut body = valid();
        body["items"] = serde_json::json!([{ "quantity": 1 }]);
        let Err(AppError::InvalidInput(message)) = build_checkout(request(body)) else {
            panic!("expected invalid input");
        };
        assert!(message.contains("items[0]"));
    }

    #[test]
    fn test_build_checkout_rejects_fractional_quantity() {
        let mut body = valid();
        body["items"][0]["qty"] = serde_json::json!(1.5);
        assert!(matches!(
            build_checkout(request(body)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_build_checkout_rejects_blank_address() {
        let mut body = valid();
        body["customer"]["address"]["city"] = serde_json::json!("  ");
        let Err(AppError::InvalidInput(message)) = build_checkout(request(body)) else {
            panic!("expected invalid input");
        };
        assert!(message.contains("city"));
    }

    #[test]
    fn test_build_checkout_rejects_negative_total() {
        let mut body = valid();
        body["pricing"]["total"] = serde_json::json!(-1);
        assert!(matches!(
            build_checkout(request(body)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_build_checkout_allows_missing_email() {
        let mut body = valid();
        body["customer"]["email"] = serde_json::Value::Null;
        let checkout = build_checkout(request(body)).unwrap();
        assert!(checkout.customer.email.is_none());
    }
}
