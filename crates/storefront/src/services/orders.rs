//! Order materializer.
//!
//! Turns a paid checkout into customer, address, order, order items and one
//! payment row inside a single transaction. Lines are re-priced from the
//! catalog; client prices are only compared and logged.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use aurora_core::{
    AddressKind, CartId, Email, OrderId, OrderStatus, PaymentStatus, Quantity, VariantId,
    line_total,
};

use crate::billing::PROVIDER_NAME;
use crate::config::StoreConfig;
use crate::db::orders::{NewOrder, NewPayment};
use crate::db::{
    CartRepository, CatalogRepository, CustomerRepository, OrderRepository, RepositoryError,
};
use crate::models::{AddressInput, CurrentUser, ItemRef, OrderDetail, Variant};
use crate::services::identity::resolve_or_create_customer;

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Neither a principal nor the checkout form supplied an email.
    #[error("an email address is required")]
    MissingEmail,

    /// A line does not resolve to a variant.
    #[error("item {index} does not reference a known variant")]
    UnknownItem { index: usize },

    /// Merged quantities of one variant exceed the line limit.
    #[error("quantity for one variant cannot exceed {max}")]
    QuantityLimit { max: i32 },

    /// The paid total does not cover the re-priced lines.
    #[error("total {total} is below the item subtotal {subtotal}")]
    TotalBelowSubtotal { total: Decimal, subtotal: Decimal },

    /// No order visible to this principal.
    #[error("order not found")]
    NotFound,

    /// A write failed; nothing was committed.
    #[error("order could not be created: {0}")]
    Persistence(#[from] RepositoryError),

    /// Reading an existing order failed.
    #[error("order could not be read: {0}")]
    Read(RepositoryError),
}

impl From<sqlx::Error> for OrderError {
    fn from(e: sqlx::Error) -> Self {
        Self::Persistence(RepositoryError::Database(e))
    }
}

/// Buyer details from the checkout form.
#[derive(Debug, Clone)]
pub struct CheckoutCustomer {
    pub email: Option<Email>,
    pub first_name: String,
    pub last_name: String,
    pub address: AddressInput,
}

/// One checkout line.
#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub item: ItemRef,
    pub quantity: Quantity,
    /// Client-displayed unit price; never persisted.
    pub unit_price_hint: Option<Decimal>,
}

/// A validated checkout.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub customer: CheckoutCustomer,
    pub items: Vec<CheckoutLine>,
    /// Amount charged, including shipping and tax.
    pub total: Decimal,
    pub notes: Option<String>,
    pub transaction_id: Option<String>,
    pub cart_id: Option<CartId>,
}

/// A resolved, merged order line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PricedLine {
    variant_id: VariantId,
    unit_price: Decimal,
    quantity: Quantity,
}

/// Email used for the order; a logged-in principal wins over the form.
fn effective_email(principal: Option<&CurrentUser>, form: Option<&Email>) -> Option<Email> {
    principal.map(|user| user.email.clone()).or_else(|| form.cloned())
}

/// Customer name: the principal's username, then "first last" from the form.
fn customer_name(principal: Option<&CurrentUser>, customer: &CheckoutCustomer) -> String {
    principal
        .map(|user| user.username.trim())
        .filter(|name| !name.is_empty())
        .map_or_else(
            || format!("{} {}", customer.first_name.trim(), customer.last_name.trim())
                .trim()
                .to_owned(),
            str::to_owned,
        )
}

/// Merge lines that resolved to the same variant, keeping first-seen order.
fn merge_lines(resolved: Vec<(Variant, Quantity)>) -> Result<Vec<PricedLine>, OrderError> {
    let mut merged: Vec<PricedLine> = Vec::with_capacity(resolved.len());
    let mut positions: HashMap<VariantId, usize> = HashMap::new();

    for (variant, quantity) in resolved {
        if let Some(line) = positions
            .get(&variant.variant_id)
            .and_then(|&pos| merged.get_mut(pos))
        {
            let sum = i64::from(line.quantity.get()) + i64::from(quantity.get());
            line.quantity =
                Quantity::new(sum).map_err(|_| OrderError::QuantityLimit { max: Quantity::MAX })?;
        } else {
            positions.insert(variant.variant_id, merged.len());
            merged.push(PricedLine {
                variant_id: variant.variant_id,
                unit_price: variant.price,
                quantity,
            });
        }
    }

    Ok(merged)
}

fn subtotal(lines: &[PricedLine]) -> Decimal {
    lines
        .iter()
        .map(|line| line_total(line.unit_price, line.quantity))
        .sum()
}

/// Order operations.
pub struct OrderService<'a> {
    pool: &'a PgPool,
    store: &'a StoreConfig,
}

impl<'a> OrderService<'a> {
    /// Create an order service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, store: &'a StoreConfig) -> Self {
        Self { pool, store }
    }

    /// Materialize a paid checkout.
    ///
    /// All rows are written in one transaction; the source cart, when named,
    /// is deleted in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::MissingEmail`, `UnknownItem`, `QuantityLimit` or
    /// `TotalBelowSubtotal` for rejected checkouts, and
    /// `OrderError::Persistence` if any write fails.
    #[instrument(skip(self, principal, checkout), fields(lines = checkout.items.len(), total = %checkout.total))]
    pub async fn create_order(
        &self,
        principal: Option<&CurrentUser>,
        checkout: Checkout,
    ) -> Result<OrderId, OrderError> {
        let email = effective_email(principal, checkout.customer.email.as_ref())
            .ok_or(OrderError::MissingEmail)?;
        let full_name = customer_name(principal, &checkout.customer);

        let mut tx = self.pool.begin().await?;

        let mut resolved = Vec::with_capacity(checkout.items.len());
        {
            let mut catalog = CatalogRepository::new(&mut tx);
            for (index, line) in checkout.items.iter().enumerate() {
                let variant = catalog
                    .resolve(line.item)
                    .await?
                    .ok_or(OrderError::UnknownItem { index })?;
                if let Some(hint) = line.unit_price_hint
                    && hint != variant.price
                {
                    tracing::warn!(
                        variant_id = %variant.variant_id,
                        client_price = %hint,
                        catalog_price = %variant.price,
                        "client price differs from catalog; using catalog price"
                    );
                }
                resolved.push((variant, line.quantity));
            }
        }

        let lines = merge_lines(resolved)?;
        let subtotal = subtotal(&lines);
        if checkout.total < subtotal {
            return Err(OrderError::TotalBelowSubtotal {
                total: checkout.total,
                subtotal,
            });
        }

        let customer = resolve_or_create_customer(&mut tx, &email, Some(&full_name)).await?;
        let address_id = CustomerRepository::new(&mut tx)
            .insert_address(
                customer.customer_id,
                AddressKind::Shipping,
                &checkout.customer.address,
                &self.store.country,
            )
            .await?;

        let mut orders = OrderRepository::new(&mut tx);
        let order_id = orders
            .insert_order(&NewOrder {
                customer_id: customer.customer_id,
                address_id,
                currency: &self.store.currency,
                status: OrderStatus::Paid,
                total_amount: checkout.total,
                notes: checkout.notes.as_deref(),
            })
            .await?;

        for line in &lines {
            orders
                .insert_item(order_id, line.variant_id, line.unit_price, line.quantity)
                .await?;
        }

        let external_payment_id = checkout
            .transaction_id
            .clone()
            .unwrap_or_else(|| format!("txn_{}", Uuid::new_v4().simple()));
        orders
            .insert_payment(
                order_id,
                &NewPayment {
                    provider: PROVIDER_NAME,
                    external_payment_id: &external_payment_id,
                    amount: checkout.total,
                    status: PaymentStatus::Succeeded,
                },
            )
            .await?;

        if let Some(cart_id) = checkout.cart_id {
            let existed = CartRepository::new(&mut tx).delete(cart_id).await?;
            if !existed {
                tracing::debug!(%cart_id, "checkout cart already gone");
            }
        }

        tx.commit().await?;

        tracing::info!(
            %order_id,
            customer_id = %customer.customer_id,
            lines = lines.len(),
            "order created"
        );
        Ok(order_id)
    }

    /// Read an order owned by `principal`.
    ///
    /// Orders of other customers read as not found.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order is absent or not owned by
    /// the principal, and `OrderError::Read` if the store fails.
    #[instrument(skip(self, principal), fields(user_id = %principal.id))]
    pub async fn get_order(
        &self,
        principal: &CurrentUser,
        order_id: OrderId,
    ) -> Result<OrderDetail, OrderError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| OrderError::Read(e.into()))?;

        read_owned_order(&mut conn, principal, order_id)
            .await
            .map_err(OrderError::Read)?
            .ok_or(OrderError::NotFound)
    }
}

/// Load an order if it belongs to the principal's customer record.
async fn read_owned_order(
    conn: &mut PgConnection,
    principal: &CurrentUser,
    order_id: OrderId,
) -> Result<Option<OrderDetail>, RepositoryError> {
    let Some(customer) = CustomerRepository::new(conn)
        .get_by_email(&principal.email)
        .await?
    else {
        return Ok(None);
    };

    let mut orders = OrderRepository::new(conn);
    let Some(order) = orders
        .get(order_id)
        .await?
        .filter(|order| order.customer_id == customer.customer_id)
    else {
        return Ok(None);
    };
    let items = orders.items(order_id).await?;
    let payment = orders.payment(order_id).await?;

    Ok(Some(OrderDetail {
        order,
        items,
        payment,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use aurora_core::{ProductId, UserId};

    use super::*;

    fn variant(price: &str) -> Variant {
        Variant {
            variant_id: VariantId::generate(),
            product_id: ProductId::generate(),
            sku: "SKU".to_string(),
            size: None,
            color: None,
            price: Decimal::from_str(price).unwrap(),
            currency: "USD".to_string(),
            stock_qty: 10,
            is_default: true,
        }
    }

    fn form() -> CheckoutCustomer {
        CheckoutCustomer {
            email: Some(Email::parse("form@example.com").unwrap()),
            first_name: " Ada ".to_string(),
            last_name: "Lovelace".to_string(),
            address: AddressInput {
                line1: "1 Main St".to_string(),
                line2: None,
                city: "Springfield".to_string(),
                region: "IL".to_string(),
                postal_code: "62701".to_string(),
            },
        }
    }

    fn principal(username: &str) -> CurrentUser {
        CurrentUser {
            id: UserId::new(7),
            email: Email::parse("login@example.com").unwrap(),
            username: username.to_string(),
        }
    }

    #[test]
    fn test_principal_email_wins() {
        let form = form();
        let user = principal("ada");
        assert_eq!(
            effective_email(Some(&user), form.email.as_ref()).unwrap().as_str(),
            "login@example.com"
        );
        assert_eq!(
            effective_email(None, form.email.as_ref()).unwrap().as_str(),
            "form@example.com"
        );
        assert!(effective_email(None, None).is_none());
    }

    #[test]
    fn test_customer_name_fallbacks() {
        let form = form();
        assert_eq!(customer_name(Some(&principal("ada99")), &form), "ada99");
        assert_eq!(customer_name(Some(&principal("  ")), &form), "Ada Lovelace");
        assert_eq!(customer_name(None, &form), "Ada Lovelace");
    }

    #[test]
    fn test_merge_lines_sums_duplicates() {
        let shirt = variant("20.00");
        let socks = variant("15.00");
        let lines = merge_lines(vec![
            (shirt.clone(), Quantity::new(1).unwrap()),
            (socks.clone(), Quantity::new(2).unwrap()),
            (shirt.clone(), Quantity::new(3).unwrap()),
        ])
        .unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].variant_id, shirt.variant_id);
        assert_eq!(lines[0].quantity.get(), 4);
        assert_eq!(subtotal(&lines), Decimal::from_str("110.00").unwrap());
    }

    #[test]
    fn test_merge_lines_enforces_limit() {
        let shirt = variant("1.00");
        let err = merge_lines(vec![
            (shirt.clone(), Quantity::new(9_000).unwrap()),
            (shirt, Quantity::new(1_000).unwrap()),
        ])
        .unwrap_err();
        assert!(matches!(err, OrderError::QuantityLimit { .. }));
    }

    #[test]
    fn test_subtotal_of_two_lines() {
        let lines = merge_lines(vec![
            (variant("20.00"), Quantity::new(1).unwrap()),
            (variant("15.00"), Quantity::new(2).unwrap()),
        ])
        .unwrap();
        assert_eq!(subtotal(&lines), Decimal::from_str("50.00").unwrap());
    }
}
