//! Sale Aggregate
//!
//! A sale is a time-bounded percentage discount scoped to a product, or to one
//! variation of it. A sale with no variation covers the whole product whenever
//! the variation in question has no sale of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use crate::domain::value_objects::Percentage;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub discount: Percentage,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

impl Sale {
    pub fn create(product_id: Uuid, variation_id: Option<Uuid>, discount: Percentage, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self { id: Uuid::now_v7(), product_id, variation_id, discount, start_date, end_date, is_active: true }
    }

    /// Active and `start_date <= as_of <= end_date`, both ends inclusive.
    pub fn is_applicable(&self, as_of: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= as_of && as_of <= self.end_date
    }

    pub fn scope(&self) -> (Uuid, Option<Uuid>) { (self.product_id, self.variation_id) }
}

/// Sales for a set of products, indexed for price lookups.
///
/// Built from one batched query per listing; only sales applicable at `as_of`
/// are retained.
#[derive(Clone, Debug, Default)]
pub struct SaleIndex {
    by_scope: HashMap<(Uuid, Option<Uuid>), Sale>,
}

impl SaleIndex {
    pub fn build(sales: impl IntoIterator<Item = Sale>, as_of: DateTime<Utc>) -> Self {
        let mut by_scope: HashMap<(Uuid, Option<Uuid>), Sale> = HashMap::new();
        for sale in sales.into_iter().filter(|s| s.is_applicable(as_of)) {
            // Two live sales on one scope should not exist; if they do, the deeper cut wins.
            match by_scope.get(&sale.scope()) {
                Some(existing) if existing.discount >= sale.discount => {}
                _ => { by_scope.insert(sale.scope(), sale); }
            }
        }
        Self { by_scope }
    }

    /// Exact (product, variation) match first, then the product-wide sale.
    pub fn lookup(&self, product_id: Uuid, variation_id: Option<Uuid>) -> Option<&Sale> {
        variation_id
            .and_then(|v| self.by_scope.get(&(product_id, Some(v))))
            .or_else(|| self.by_scope.get(&(product_id, None)))
    }

    pub fn len(&self) -> usize { self.by_scope.len() }
    pub fn is_empty(&self) -> bool { self.by_scope.is_empty() }
}
