//! Cart store.
//!
//! Carts are working state; every mutation resolves its variant first and
//! runs in one short transaction. `add_item` increments in the database so
//! concurrent adds for the same line sum. `set_item_qty` is last-writer-wins
//! and makes no guarantee against concurrent calls for the same line.

use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use aurora_core::{CartId, CustomerId, Quantity, QuantityUpdate, VariantId};

use crate::db::{CartRepository, CatalogRepository, RepositoryError};
use crate::models::{CartHeader, CartView, ItemRef};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The referenced variant or product does not resolve to a variant.
    #[error("unknown variant")]
    UnknownVariant,

    /// The referenced cart does not exist.
    #[error("unknown cart")]
    UnknownCart,

    /// The referenced customer does not exist.
    #[error("unknown customer")]
    UnknownCustomer,

    /// The line would exceed the per-line quantity limit.
    #[error("cart line cannot exceed {max} units")]
    QuantityLimit { max: i32 },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CartError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// Map line-write failures onto the cart taxonomy.
fn line_error(e: RepositoryError) -> CartError {
    match e {
        RepositoryError::Conflict(_) => CartError::QuantityLimit { max: Quantity::MAX },
        // The variant or cart vanished between resolve and write
        RepositoryError::NotFound => CartError::UnknownVariant,
        other => CartError::Repository(other),
    }
}

/// An add-to-cart request after validation.
#[derive(Debug, Clone)]
pub struct AddItem {
    pub cart_id: Option<CartId>,
    pub item: ItemRef,
    pub quantity: Quantity,
    pub customer_id: Option<CustomerId>,
    pub session_token: Option<String>,
}

/// Cart operations over a pool.
pub struct CartService<'a> {
    pool: &'a PgPool,
}

impl<'a> CartService<'a> {
    /// Create a cart service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Add units of a variant, creating the cart when `cart_id` is absent.
    ///
    /// Returns the cart the line was added to.
    ///
    /// # Errors
    ///
    /// Returns `CartError::UnknownVariant`, `UnknownCart` or `UnknownCustomer`
    /// for dangling references and `CartError::QuantityLimit` if the summed
    /// line would exceed [`Quantity::MAX`].
    #[instrument(skip(self, cmd), fields(cart_id = ?cmd.cart_id, item = ?cmd.item, quantity = %cmd.quantity))]
    pub async fn add_item(&self, cmd: AddItem) -> Result<CartId, CartError> {
        let mut tx = self.pool.begin().await?;

        let variant = CatalogRepository::new(&mut tx)
            .resolve(cmd.item)
            .await?
            .ok_or(CartError::UnknownVariant)?;

        let mut carts = CartRepository::new(&mut tx);
        let cart_id = match cmd.cart_id {
            Some(cart_id) => {
                carts.get(cart_id).await?.ok_or(CartError::UnknownCart)?;
                cart_id
            }
            None => carts
                .create(cmd.customer_id, cmd.session_token.as_deref())
                .await
                .map_err(|e| match e {
                    RepositoryError::NotFound => CartError::UnknownCustomer,
                    other => CartError::Repository(other),
                })?,
        };

        let total = carts
            .add_item(cart_id, variant.variant_id, cmd.quantity)
            .await
            .map_err(line_error)?;

        tx.commit().await?;

        tracing::info!(%cart_id, variant_id = %variant.variant_id, line_quantity = total, "item added to cart");
        Ok(cart_id)
    }

    /// Set a line's quantity; [`QuantityUpdate::Remove`] deletes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::UnknownCart` or `UnknownVariant` for dangling
    /// references when setting a positive quantity.
    #[instrument(skip(self))]
    pub async fn set_item_qty(
        &self,
        cart_id: CartId,
        variant_id: VariantId,
        update: QuantityUpdate,
    ) -> Result<(), CartError> {
        let quantity = match update {
            QuantityUpdate::Remove => {
                self.remove_item(cart_id, variant_id).await?;
                return Ok(());
            }
            QuantityUpdate::Set(quantity) => quantity,
        };

        let mut tx = self.pool.begin().await?;

        CatalogRepository::new(&mut tx)
            .get_variant(variant_id)
            .await?
            .ok_or(CartError::UnknownVariant)?;

        let mut carts = CartRepository::new(&mut tx);
        carts.get(cart_id).await?.ok_or(CartError::UnknownCart)?;
        carts
            .set_item(cart_id, variant_id, quantity)
            .await
            .map_err(line_error)?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete one line. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the delete fails.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, cart_id: CartId, variant_id: VariantId) -> Result<bool, CartError> {
        let mut conn = self.pool.acquire().await?;
        let removed = CartRepository::new(&mut conn)
            .remove_item(cart_id, variant_id)
            .await?;
        Ok(removed)
    }

    /// Delete a cart with all its lines. Returns whether the cart existed.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the delete fails.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, cart_id: CartId) -> Result<bool, CartError> {
        let mut tx = self.pool.begin().await?;
        let existed = CartRepository::new(&mut tx).delete(cart_id).await?;
        tx.commit().await?;
        Ok(existed)
    }

    /// Read a cart with display lines.
    ///
    /// A missing cart reads as a stub with no items.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: CartId) -> Result<CartView, CartError> {
        let mut conn = self.pool.acquire().await?;
        let mut carts = CartRepository::new(&mut conn);

        let Some(cart) = carts.get(cart_id).await? else {
            return Ok(CartView::new(CartHeader::stub(cart_id), Vec::new()));
        };
        let items = carts.lines(cart_id).await?;

        Ok(CartView::new(cart.into(), items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_error_mapping() {
        assert!(matches!(
            line_error(RepositoryError::Conflict("limit".into())),
            CartError::QuantityLimit { max: Quantity::MAX }
        ));
        assert!(matches!(
            line_error(RepositoryError::NotFound),
            CartError::UnknownVariant
        ));
        assert!(matches!(
            line_error(RepositoryError::DataCorruption("x".into())),
            CartError::Repository(_)
        ));
    }
}
