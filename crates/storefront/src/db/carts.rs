//! Cart and cart-item repository.

use rust_decimal::Decimal;
use sqlx::PgConnection;

use aurora_core::{CartId, CustomerId, ProductId, Quantity, VariantId, line_total};

use super::RepositoryError;
use crate::models::{Cart, CartLine};

const QUANTITY_LIMIT: &str = "cart line quantity limit exceeded";

/// Row of the cart-lines join, before quantity validation.
#[derive(sqlx::FromRow)]
struct CartLineRow {
    variant_id: VariantId,
    product_id: ProductId,
    product_title: String,
    sku: String,
    size: Option<String>,
    color: Option<String>,
    price: Decimal,
    currency: String,
    quantity: i32,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(i64::from(row.quantity)).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid cart quantity in database: {e}"))
        })?;
        Ok(Self {
            variant_id: row.variant_id,
            product_id: row.product_id,
            product_title: row.product_title,
            sku: row.sku,
            size: row.size,
            color: row.color,
            unit_price: row.price,
            currency: row.currency,
            quantity,
            line_total: line_total(row.price, quantity),
        })
    }
}

/// Repository for carts.
pub struct CartRepository<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> CartRepository<'c> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// Create an active cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if `customer_id` does not exist.
    pub async fn create(
        &mut self,
        customer_id: Option<CustomerId>,
        session_token: Option<&str>,
    ) -> Result<CartId, RepositoryError> {
        let cart_id = CartId::generate();
        sqlx::query(
            r"
            INSERT INTO carts (cart_id, customer_id, session_token, status)
            VALUES ($1, $2, $3, 'active')
            ",
        )
        .bind(cart_id)
        .bind(customer_id)
        .bind(session_token)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "cart already exists"))?;

        Ok(cart_id)
    }

    /// Get a cart header.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&mut self, cart_id: CartId) -> Result<Option<Cart>, RepositoryError> {
        let cart = sqlx::query_as::<_, Cart>(
            r"
            SELECT cart_id, customer_id, session_token, status, created_at, updated_at
            FROM carts
            WHERE cart_id = $1
            ",
        )
        .bind(cart_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(cart)
    }

    /// Add `quantity` of a variant, incrementing an existing line.
    ///
    /// Concurrent adds for the same line sum. Returns the line's new quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the cart or variant is gone and
    /// `RepositoryError::Conflict` if the line would exceed the quantity limit.
    pub async fn add_item(
        &mut self,
        cart_id: CartId,
        variant_id: VariantId,
        quantity: Quantity,
    ) -> Result<i32, RepositoryError> {
        let total = sqlx::query_scalar::<_, i32>(
            r"
            INSERT INTO cart_items (cart_id, variant_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, variant_id) DO UPDATE
            SET quantity = cart_items.quantity + EXCLUDED.quantity
            RETURNING quantity
            ",
        )
        .bind(cart_id)
        .bind(variant_id)
        .bind(quantity.get())
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, QUANTITY_LIMIT))?;

        self.touch(cart_id).await?;
        Ok(total)
    }

    /// Set a line's quantity, creating the line if needed. Last writer wins.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the cart or variant is gone.
    pub async fn set_item(
        &mut self,
        cart_id: CartId,
        variant_id: VariantId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO cart_items (cart_id, variant_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, variant_id) DO UPDATE
            SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(cart_id)
        .bind(variant_id)
        .bind(quantity.get())
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, QUANTITY_LIMIT))?;

        self.touch(cart_id).await
    }

    /// Delete one line. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove_item(
        &mut self,
        cart_id: CartId,
        variant_id: VariantId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND variant_id = $2")
            .bind(cart_id)
            .bind(variant_id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() > 0 {
            self.touch(cart_id).await?;
        }
        Ok(result.rows_affected() > 0)
    }

    /// Delete a cart and all of its lines. Returns whether the cart existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&mut self, cart_id: CartId) -> Result<bool, RepositoryError> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *self.conn)
            .await?;
        let result = sqlx::query("DELETE FROM carts WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lines of a cart joined with variant and product, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` if a stored quantity is out of range.
    pub async fn lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT ci.variant_id, v.product_id, p.title AS product_title, v.sku, v.size, v.color,
                   v.price, v.currency, ci.quantity
            FROM cart_items ci
            JOIN variants v ON v.variant_id = ci.variant_id
            JOIN products p ON p.product_id = v.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.added_at, ci.variant_id
            ",
        )
        .bind(cart_id)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(CartLine::try_from).collect()
    }

    async fn touch(&mut self, cart_id: CartId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
