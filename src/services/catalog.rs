//! Catalog browsing, and the enrichment cart and wishlist lines rely on.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::Context;
use crate::domain::aggregates::{CartEntry, CartLine, Product, ProductVariation, Review, SaleIndex, WishlistEntry, WishlistLine};
use crate::domain::pricing::{quote, PriceQuote};
use crate::store::ProductQuery;
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, Serialize)]
pub struct PricedProduct {
    #[serde(flatten)]
    pub product: Product,
    pub price: PriceQuote,
}

#[derive(Clone, Debug, Serialize)]
pub struct PricedVariation {
    #[serde(flatten)]
    pub variation: ProductVariation,
    pub price: PriceQuote,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: PricedProduct,
    pub variations: Vec<PricedVariation>,
}

#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub data: Vec<PricedProduct>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Clone)]
pub struct CatalogService {
    ctx: Context,
}

impl CatalogService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    async fn sale_index(&self, product_ids: &[Uuid]) -> Result<SaleIndex> {
        if product_ids.is_empty() { return Ok(SaleIndex::default()); }
        let sales = self.ctx.store.sales_for_products(product_ids).await?;
        Ok(SaleIndex::build(sales, self.ctx.clock.now()))
    }

    /// One page of products, priced against a single batched sale lookup.
    #[instrument(skip(self))]
    pub async fn list(&self, query: &ProductQuery) -> Result<ProductPage> {
        let (products, total) = self.ctx.store.list_products(query).await?;
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let sales = self.sale_index(&ids).await?;
        let now = self.ctx.clock.now();
        let data = products
            .into_iter()
            .map(|product| {
                let price = quote(&product, None, &sales, now);
                PricedProduct { product, price }
            })
            .collect();
        Ok(ProductPage { data, total, page: query.page(), per_page: query.limit() })
    }

    pub async fn product(&self, id: Uuid) -> Result<ProductDetail> {
        let product = self.ctx.store.get_product(id).await?.ok_or_else(|| StorefrontError::not_found("product", id))?;
        let variations = self.ctx.store.variations_for(id).await?;
        let sales = self.sale_index(&[id]).await?;
        let now = self.ctx.clock.now();
        let variations = variations
            .into_iter()
            .map(|variation| {
                let price = quote(&product, Some(&variation), &sales, now);
                PricedVariation { variation, price }
            })
            .collect();
        let price = quote(&product, None, &sales, now);
        Ok(ProductDetail { product: PricedProduct { product, price }, variations })
    }

    pub async fn reviews(&self, product_id: Uuid) -> Result<Vec<Review>> {
        let mut reviews = self.ctx.store.reviews_for_product(product_id).await?;
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    /// Current price of one product (and variation) for a cart insert.
    pub(crate) async fn price_item(&self, product_id: Uuid, variation_id: Option<Uuid>) -> Result<(Product, Option<ProductVariation>, PriceQuote)> {
        let product = self.ctx.store.get_product(product_id).await?.ok_or_else(|| StorefrontError::not_found("product", product_id))?;
        let variation = match variation_id {
            Some(vid) => {
                let found = self.ctx.store.variations_by_ids(&[vid]).await?.into_iter().find(|v| v.product_id == product_id);
                Some(found.ok_or_else(|| StorefrontError::not_found("variation", vid))?)
            }
            None => None,
        };
        let sales = self.sale_index(&[product_id]).await?;
        let price = quote(&product, variation.as_ref(), &sales, self.ctx.clock.now());
        Ok((product, variation, price))
    }

    /// Joins stored cart entries with catalog data and current prices.
    ///
    /// Entries whose product or variation no longer exists are dropped.
    pub(crate) async fn enrich_cart(&self, entries: Vec<CartEntry>) -> Result<Vec<CartLine>> {
        let (products, variations) = self.load_refs(entries.iter().map(|e| (e.product_id, e.variation_id))).await?;
        let ids: Vec<Uuid> = products.keys().copied().collect();
        let sales = self.sale_index(&ids).await?;
        let now = self.ctx.clock.now();
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(product) = products.get(&entry.product_id) else {
                debug!(product_id = %entry.product_id, "dropping cart entry for missing product");
                continue;
            };
            let variation = match entry.variation_id {
                Some(vid) => match variations.get(&vid) {
                    Some(v) => Some(v),
                    None => {
                        debug!(variation_id = %vid, "dropping cart entry for missing variation");
                        continue;
                    }
                },
                None => None,
            };
            let price = quote(product, variation, &sales, now);
            lines.push(CartLine::priced(entry, product.name.clone(), variation.map(|v| v.name.clone()), product.thumbnail().map(str::to_string), price));
        }
        Ok(lines)
    }

    pub(crate) async fn enrich_wishlist(&self, entries: Vec<WishlistEntry>) -> Result<Vec<WishlistLine>> {
        let (products, _) = self.load_refs(entries.iter().map(|e| (e.product_id, None))).await?;
        let ids: Vec<Uuid> = products.keys().copied().collect();
        let sales = self.sale_index(&ids).await?;
        let now = self.ctx.clock.now();
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let product = products.get(&entry.product_id)?;
                Some(WishlistLine {
                    product_name: product.name.clone(),
                    image: product.thumbnail().map(str::to_string),
                    price: quote(product, None, &sales, now),
                    entry,
                })
            })
            .collect())
    }

    async fn load_refs(&self, refs: impl Iterator<Item = (Uuid, Option<Uuid>)>) -> Result<(HashMap<Uuid, Product>, HashMap<Uuid, ProductVariation>)> {
        let mut product_ids = HashSet::new();
        let mut variation_ids = HashSet::new();
        for (pid, vid) in refs {
            product_ids.insert(pid);
            variation_ids.extend(vid);
        }
        let product_ids: Vec<Uuid> = product_ids.into_iter().collect();
        let variation_ids: Vec<Uuid> = variation_ids.into_iter().collect();
        let products = if product_ids.is_empty() { Vec::new() } else { self.ctx.store.products_by_ids(&product_ids).await? };
        let variations = if variation_ids.is_empty() { Vec::new() } else { self.ctx.store.variations_by_ids(&variation_ids).await? };
        Ok((
            products.into_iter().map(|p| (p.id, p)).collect(),
            variations.into_iter().map(|v| (v.id, v)).collect(),
        ))
    }
}
