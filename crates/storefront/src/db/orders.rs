//! Order, order-item and payment repository.
//!
//! Orders are written once; nothing here updates them.

use rust_decimal::Decimal;
use sqlx::PgConnection;

use aurora_core::{
    AddressId, CurrencyCode, CustomerId, OrderId, OrderStatus, PaymentId, PaymentStatus, Quantity,
    VariantId,
};

use super::RepositoryError;
use crate::models::{OrderLine, OrderRecord, PaymentRecord};

/// Order header fields.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub customer_id: CustomerId,
    pub address_id: AddressId,
    pub currency: &'a CurrencyCode,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub notes: Option<&'a str>,
}

/// Payment fields.
#[derive(Debug, Clone)]
pub struct NewPayment<'a> {
    pub provider: &'a str,
    pub external_payment_id: &'a str,
    pub amount: Decimal,
    pub status: PaymentStatus,
}

/// Repository for orders.
pub struct OrderRepository<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> OrderRepository<'c> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// Insert an order header.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the customer or address is missing.
    pub async fn insert_order(&mut self, order: &NewOrder<'_>) -> Result<OrderId, RepositoryError> {
        let order_id = OrderId::generate();
        sqlx::query(
            r"
            INSERT INTO orders (order_id, customer_id, address_id, currency, status, total_amount, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(order_id)
        .bind(order.customer_id)
        .bind(order.address_id)
        .bind(order.currency.as_str())
        .bind(order.status)
        .bind(order.total_amount)
        .bind(order.notes)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "invalid order"))?;

        Ok(order_id)
    }

    /// Insert one order line with its captured unit price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the variant is already on the order.
    pub async fn insert_item(
        &mut self,
        order_id: OrderId,
        variant_id: VariantId,
        unit_price: Decimal,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO order_items (order_id, variant_id, unit_price, quantity)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(order_id)
        .bind(variant_id)
        .bind(unit_price)
        .bind(quantity.get())
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "duplicate order line"))?;

        Ok(())
    }

    /// Insert the order's payment record.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order already has a payment.
    pub async fn insert_payment(
        &mut self,
        order_id: OrderId,
        payment: &NewPayment<'_>,
    ) -> Result<PaymentId, RepositoryError> {
        let payment_id = PaymentId::generate();
        sqlx::query(
            r"
            INSERT INTO payments (payment_id, order_id, provider, external_payment_id, amount, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(payment_id)
        .bind(order_id)
        .bind(payment.provider)
        .bind(payment.external_payment_id)
        .bind(payment.amount)
        .bind(payment.status)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "order already has a payment"))?;

        Ok(payment_id)
    }

    /// Get an order header.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let order = sqlx::query_as::<_, OrderRecord>(
            r"
            SELECT order_id, customer_id, address_id, currency, status, total_amount, notes, placed_at
            FROM orders
            WHERE order_id = $1
            ",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(order)
    }

    /// Lines of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&mut self, order_id: OrderId) -> Result<Vec<OrderLine>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderLine>(
            r"
            SELECT variant_id, unit_price, quantity
            FROM order_items
            WHERE order_id = $1
            ORDER BY variant_id
            ",
        )
        .bind(order_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(items)
    }

    /// Payment of an order, if recorded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn payment(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let payment = sqlx::query_as::<_, PaymentRecord>(
            r"
            SELECT payment_id, provider, external_payment_id, amount, status, created_at
            FROM payments
            WHERE order_id = $1
            ",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(payment)
    }
}
