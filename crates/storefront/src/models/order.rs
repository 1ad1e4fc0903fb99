//! Order read models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use aurora_core::{
    AddressId, CustomerId, OrderId, OrderStatus, PaymentId, PaymentStatus, VariantId,
};

/// Stored order header.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub address_id: AddressId,
    pub currency: String,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub placed_at: DateTime<Utc>,
}

/// A line captured at purchase time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderLine {
    pub variant_id: VariantId,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// The payment recorded with an order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub provider: String,
    pub external_payment_id: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Response body of `GET /orders/{order_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderRecord,
    pub items: Vec<OrderLine>,
    pub payment: Option<PaymentRecord>,
}
