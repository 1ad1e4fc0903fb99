//! Catalog repository.
//!
//! The storefront only reads variants; the write methods back the
//! `catalog seed` CLI command.

use rust_decimal::Decimal;
use sqlx::PgConnection;

use aurora_core::{ProductId, VariantId};

use super::RepositoryError;
use crate::models::{ItemRef, Variant, choose_default_variant};

/// Repository for products and variants.
pub struct CatalogRepository<'c> {
    conn: &'c mut PgConnection,
}

/// Variant fields written by catalog tooling.
#[derive(Debug, Clone)]
pub struct VariantUpsert<'a> {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub sku: &'a str,
    pub size: Option<&'a str>,
    pub color: Option<&'a str>,
    pub price: Decimal,
    pub currency: &'a str,
    pub stock_qty: i32,
    pub is_default: bool,
}

impl<'c> CatalogRepository<'c> {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// Get a variant by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_variant(&mut self, id: VariantId) -> Result<Option<Variant>, RepositoryError> {
        let variant = sqlx::query_as::<_, Variant>(
            r"
            SELECT variant_id, product_id, sku, size, color, price, currency, stock_qty, is_default
            FROM variants
            WHERE variant_id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(variant)
    }

    /// All variants of a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn variants_for_product(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<Variant>, RepositoryError> {
        let variants = sqlx::query_as::<_, Variant>(
            r"
            SELECT variant_id, product_id, sku, size, color, price, currency, stock_qty, is_default
            FROM variants
            WHERE product_id = $1
            ",
        )
        .bind(product_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(variants)
    }

    /// Resolve a line reference to a variant.
    ///
    /// A bare product resolves through [`choose_default_variant`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn resolve(&mut self, item: ItemRef) -> Result<Option<Variant>, RepositoryError> {
        match item {
            ItemRef::Variant(variant_id) => self.get_variant(variant_id).await,
            ItemRef::Product(product_id) => {
                let variants = self.variants_for_product(product_id).await?;
                Ok(choose_default_variant(&variants).cloned())
            }
        }
    }

    /// Insert or update a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the handle belongs to another product.
    pub async fn upsert_product(
        &mut self,
        product_id: ProductId,
        title: &str,
        handle: &str,
        description: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO products (product_id, title, handle, description)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id) DO UPDATE
            SET title = EXCLUDED.title, handle = EXCLUDED.handle, description = EXCLUDED.description
            ",
        )
        .bind(product_id)
        .bind(title)
        .bind(handle)
        .bind(description)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "product handle already in use"))?;

        Ok(())
    }

    /// Insert or update a variant by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a duplicate SKU or a second
    /// default variant for the product.
    pub async fn upsert_variant(&mut self, variant: &VariantUpsert<'_>) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO variants
                (variant_id, product_id, sku, size, color, price, currency, stock_qty, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (variant_id) DO UPDATE
            SET product_id = EXCLUDED.product_id,
                sku = EXCLUDED.sku,
                size = EXCLUDED.size,
                color = EXCLUDED.color,
                price = EXCLUDED.price,
                currency = EXCLUDED.currency,
                stock_qty = EXCLUDED.stock_qty,
                is_default = EXCLUDED.is_default
            ",
        )
        .bind(variant.variant_id)
        .bind(variant.product_id)
        .bind(variant.sku)
        .bind(variant.size)
        .bind(variant.color)
        .bind(variant.price)
        .bind(variant.currency)
        .bind(variant.stock_qty)
        .bind(variant.is_default)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "duplicate sku or default variant"))?;

        Ok(())
    }
}
