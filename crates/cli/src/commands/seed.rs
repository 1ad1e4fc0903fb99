//! Seed the catalog from a JSON file.
//!
//! Products and variants are upserted by ID inside one transaction, so a
//! file can be applied repeatedly and a bad entry leaves nothing behind.
//!
//! ```json
//! {
//!   "products": [{
//!     "product_id": "0f8fad5b-d9cb-469f-a165-70867728950e",
//!     "title": "Aurora Tee",
//!     "handle": "aurora-tee",
//!     "variants": [{
//!       "variant_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
//!       "sku": "TEE-M-BLK",
//!       "size": "M",
//!       "color": "Black",
//!       "price": "25.00",
//!       "stock_qty": 40,
//!       "is_default": true
//!     }]
//!   }]
//! }
//! ```

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use aurora_core::{ProductId, VariantId, validate_amount};
use aurora_storefront::db::CatalogRepository;
use aurora_storefront::db::catalog::VariantUpsert;

use super::{CommandError, connect};

/// Top-level seed file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<ProductSeed>,
}

/// One product and its variants.
#[derive(Debug, Deserialize)]
pub struct ProductSeed {
    pub product_id: ProductId,
    pub title: String,
    pub handle: String,
    pub description: Option<String>,
    #[serde(default)]
    pub variants: Vec<VariantSeed>,
}

/// One purchasable variant.
#[derive(Debug, Deserialize)]
pub struct VariantSeed {
    pub variant_id: VariantId,
    pub sku: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub price: Decimal,
    /// Defaults to `STORE_CURRENCY`, then `USD`.
    pub currency: Option<String>,
    #[serde(default)]
    pub stock_qty: i32,
    #[serde(default)]
    pub is_default: bool,
}

/// Problems that make a seed file unusable, one message per entry.
#[must_use]
pub fn validate(file: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();

    for product in &file.products {
        if product.title.trim().is_empty() {
            errors.push(format!("product {}: title is empty", product.product_id));
        }
        if product.handle.trim().is_empty() {
            errors.push(format!("product {}: handle is empty", product.product_id));
        }
        if product.variants.iter().filter(|v| v.is_default).count() > 1 {
            errors.push(format!(
                "product {}: more than one default variant",
                product.product_id
            ));
        }
        for variant in &product.variants {
            if variant.sku.trim().is_empty() {
                errors.push(format!("variant {}: sku is empty", variant.variant_id));
            }
            if let Err(e) = validate_amount(variant.price) {
                errors.push(format!("variant {}: price {e}", variant.variant_id));
            }
            if variant.stock_qty < 0 {
                errors.push(format!("variant {}: stock_qty is negative", variant.variant_id));
            }
        }
    }

    errors
}

/// Upsert every product and variant in `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// or any upsert fails (in which case nothing is written).
pub async fn catalog(file_path: &str) -> Result<(), CommandError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(CommandError::Other(format!("File not found: {file_path}")));
    }

    info!(path = %file_path, "Loading catalog from file");

    // Read and validate before connecting to database
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CommandError::Other(format!("Cannot read {file_path}: {e}")))?;
    let file: CatalogFile = serde_json::from_str(&content)
        .map_err(|e| CommandError::Other(format!("Invalid catalog file: {e}")))?;

    let errors = validate(&file);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CommandError::Other(format!(
            "{} validation errors found",
            errors.len()
        )));
    }

    let default_currency = std::env::var("STORE_CURRENCY").unwrap_or_else(|_| "USD".to_owned());

    let pool = connect().await?;
    let mut tx = pool.begin().await?;
    let mut variants = 0_usize;

    for product in &file.products {
        let mut catalog = CatalogRepository::new(&mut tx);
        catalog
            .upsert_product(
                product.product_id,
                product.title.trim(),
                product.handle.trim(),
                product.description.as_deref(),
            )
            .await
            .map_err(|e| CommandError::Other(format!("product {}: {e}", product.product_id)))?;

        for variant in &product.variants {
            catalog
                .upsert_variant(&VariantUpsert {
                    variant_id: variant.variant_id,
                    product_id: product.product_id,
                    sku: variant.sku.trim(),
                    size: variant.size.as_deref(),
                    color: variant.color.as_deref(),
                    price: variant.price,
                    currency: variant.currency.as_deref().unwrap_or(&default_currency),
                    stock_qty: variant.stock_qty,
                    is_default: variant.is_default,
                })
                .await
                .map_err(|e| CommandError::Other(format!("variant {}: {e}", variant.variant_id)))?;
            variants += 1;
        }
    }

    tx.commit().await?;

    info!("Seeding complete!");
    info!("  Products upserted: {}", file.products.len());
    info!("  Variants upserted: {variants}");
    Ok(())
}
