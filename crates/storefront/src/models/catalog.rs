//! Catalog reference data as seen by the storefront.

use rust_decimal::Decimal;
use serde::Serialize;

use aurora_core::{ProductId, VariantId};

/// A purchasable SKU of a product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Variant {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub stock_qty: i32,
    pub is_default: bool,
}

/// What a cart or checkout line points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRef {
    /// An explicit variant.
    Variant(VariantId),
    /// A product, resolved through [`choose_default_variant`].
    Product(ProductId),
}

impl ItemRef {
    /// Build a reference from optional request fields; `variant_id` wins.
    #[must_use]
    pub const fn from_parts(variant_id: Option<VariantId>, product_id: Option<ProductId>) -> Option<Self> {
        match (variant_id, product_id) {
            (Some(variant_id), _) => Some(Self::Variant(variant_id)),
            (None, Some(product_id)) => Some(Self::Product(product_id)),
            (None, None) => None,
        }
    }
}

/// Pick the variant a bare product reference resolves to.
///
/// Order: flagged `is_default`, then lowest price, then `sku`, then
/// `variant_id`. Independent of the order rows come back in.
#[must_use]
pub fn choose_default_variant(variants: &[Variant]) -> Option<&Variant> {
    variants.iter().min_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.price.cmp(&b.price))
            .then_with(|| a.sku.cmp(&b.sku))
            .then_with(|| a.variant_id.cmp(&b.variant_id))
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn variant(sku: &str, price: i64, is_default: bool) -> Variant {
        Variant {
            variant_id: VariantId::generate(),
            product_id: ProductId::from_uuid(Uuid::nil()),
            sku: sku.to_string(),
            size: None,
            color: None,
            price: Decimal::new(price, 2),
            currency: "USD".to_string(),
            stock_qty: 10,
            is_default,
        }
    }

    #[test]
    fn test_flagged_default_wins_over_price() {
        let variants = [variant("B", 1000, false), variant("A", 2500, true)];
        assert_eq!(choose_default_variant(&variants).map(|v| v.sku.as_str()), Some("A"));
    }

    #[test]
    fn test_lowest_price_then_sku() {
        let variants = [
            variant("TEE-L", 2000, false),
            variant("TEE-M", 1500, false),
            variant("TEE-S", 1500, false),
        ];
        assert_eq!(
            choose_default_variant(&variants).map(|v| v.sku.as_str()),
            Some("TEE-M")
        );

        let mut reversed = variants.clone();
        reversed.reverse();
        assert_eq!(
            choose_default_variant(&reversed).map(|v| v.sku.as_str()),
            Some("TEE-M")
        );
    }

    #[test]
    fn test_item_ref_prefers_variant() {
        let variant_id = VariantId::generate();
        let product_id = ProductId::generate();
        assert_eq!(
            ItemRef::from_parts(Some(variant_id), Some(product_id)),
            Some(ItemRef::Variant(variant_id))
        );
        assert_eq!(
            ItemRef::from_parts(None, Some(product_id)),
            Some(ItemRef::Product(product_id))
        );
        assert_eq!(ItemRef::from_parts(None, None), None);
    }

    #[test]
    fn test_no_variants() {
        assert!(choose_default_variant(&[]).is_none());
    }
}
