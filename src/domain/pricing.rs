//! Sale-aware price resolution.
//!
//! Every unit price shown to a customer or snapshotted onto a cart line goes
//! through [`resolve_price`]. Sale lookups are the caller's job; listings should
//! build one [`SaleIndex`] from a single batched query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::{Product, ProductVariation, Sale, SaleIndex};
use crate::domain::value_objects::{Money, Percentage};

/// `(base + adjustment)`, less the sale percentage when the sale applies at `as_of`.
pub fn resolve_price(base_price: Money, variation_adjustment: Money, sale: Option<&Sale>, as_of: DateTime<Utc>) -> Money {
    let list = base_price + variation_adjustment;
    match sale {
        Some(sale) if sale.is_applicable(as_of) => list.discounted_by(sale.discount),
        _ => list,
    }
}

/// A resolved price with the pieces a storefront needs to render it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Base price plus variation adjustment.
    pub list_price: Money,
    pub unit_price: Money,
    pub sale_discount: Option<Percentage>,
}

impl PriceQuote {
    pub fn is_on_sale(&self) -> bool { self.sale_discount.is_some() }
}

/// Quote a product, optionally for one of its variations, against an index.
pub fn quote(product: &Product, variation: Option<&ProductVariation>, sales: &SaleIndex, as_of: DateTime<Utc>) -> PriceQuote {
    let adjustment = variation.map(|v| v.price_adjustment).unwrap_or_default();
    let sale = sales.lookup(product.id, variation.map(|v| v.id)).filter(|s| s.is_applicable(as_of));
    PriceQuote {
        list_price: product.base_price + adjustment,
        unit_price: resolve_price(product.base_price, adjustment, sale, as_of),
        sale_discount: sale.map(|s| s.discount),
    }
}
