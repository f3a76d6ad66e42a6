//! Cart and Wishlist Aggregates
//!
//! Entries are what gets persisted (remote rows or device storage); lines are
//! entries enriched with product details and a price snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::pricing::PriceQuote;
use crate::domain::value_objects::{Money, Percentage};

/// Most units of one item a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 9_999;

/// Persisted form of a cart line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

impl CartEntry {
    pub fn new(product_id: Uuid, variation_id: Option<Uuid>, quantity: u32) -> Self {
        Self { id: Uuid::now_v7(), product_id, variation_id, quantity, added_at: Utc::now() }
    }
    pub fn same_item(&self, product_id: Uuid, variation_id: Option<Uuid>) -> bool {
        self.product_id == product_id && self.variation_id == variation_id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub entry: CartEntry,
    pub product_name: String,
    pub variation_name: Option<String>,
    pub image: Option<String>,
    pub list_price: Money,
    /// Snapshot taken when the line was inserted, merged or loaded.
    pub unit_price: Money,
    pub sale_discount: Option<Percentage>,
}

impl CartLine {
    pub fn priced(entry: CartEntry, product_name: String, variation_name: Option<String>, image: Option<String>, quote: PriceQuote) -> Self {
        Self {
            entry, product_name, variation_name, image,
            list_price: quote.list_price, unit_price: quote.unit_price, sale_discount: quote.sale_discount,
        }
    }
    pub fn id(&self) -> Uuid { self.entry.id }
    pub fn quantity(&self) -> u32 { self.entry.quantity }
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.entry.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CartSummary {
    pub line_count: usize,
    pub item_count: u32,
    pub subtotal: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }
    pub fn from_lines(lines: Vec<CartLine>) -> Self { Self { lines } }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn line(&self, id: Uuid) -> Option<&CartLine> { self.lines.iter().find(|l| l.id() == id) }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn find(&self, product_id: Uuid, variation_id: Option<Uuid>) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.entry.same_item(product_id, variation_id))
    }

    /// Entry to persist for adding `quantity` of an item: the existing line with
    /// its quantity increased, or a fresh entry.
    pub fn plan_add(&self, product_id: Uuid, variation_id: Option<Uuid>, quantity: u32) -> CartEntry {
        match self.find(product_id, variation_id) {
            Some(line) => CartEntry { quantity: line.quantity().saturating_add(quantity), ..line.entry.clone() },
            None => CartEntry::new(product_id, variation_id, quantity),
        }
    }

    /// Replaces the line with the same id, keeping its position, or appends.
    pub fn upsert(&mut self, line: CartLine) {
        match self.lines.iter_mut().find(|l| l.id() == line.id()) {
            Some(existing) => *existing = line,
            None => self.lines.push(line),
        }
    }

    pub fn set_quantity(&mut self, id: Uuid, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 { return self.remove(id); }
        let line = self.lines.iter_mut().find(|l| l.id() == id).ok_or(CartError::ItemNotFound)?;
        line.entry.quantity = quantity;
        Ok(())
    }

    pub fn remove(&mut self, id: Uuid) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.id() != id);
        if self.lines.len() == before { return Err(CartError::ItemNotFound); }
        Ok(())
    }

    pub fn clear(&mut self) { self.lines.clear(); }

    pub fn total_item_count(&self) -> u32 { self.lines.iter().fold(0u32, |n, l| n.saturating_add(l.quantity())) }
    pub fn subtotal(&self) -> Money { self.lines.iter().map(CartLine::line_total).sum() }

    pub fn summary(&self) -> CartSummary {
        CartSummary { line_count: self.lines.len(), item_count: self.total_item_count(), subtotal: self.subtotal() }
    }
}

/// Persisted form of a wishlist line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub added_at: DateTime<Utc>,
}

impl WishlistEntry {
    pub fn new(product_id: Uuid) -> Self { Self { id: Uuid::now_v7(), product_id, added_at: Utc::now() } }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WishlistLine {
    #[serde(flatten)]
    pub entry: WishlistEntry,
    pub product_name: String,
    pub image: Option<String>,
    pub price: PriceQuote,
}

impl WishlistLine {
    pub fn id(&self) -> Uuid { self.entry.id }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Wishlist {
    lines: Vec<WishlistLine>,
}

impl Wishlist {
    pub fn from_lines(lines: Vec<WishlistLine>) -> Self { Self { lines } }
    pub fn lines(&self) -> &[WishlistLine] { &self.lines }
    pub fn len(&self) -> usize { self.lines.len() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line(&self, id: Uuid) -> Option<&WishlistLine> { self.lines.iter().find(|l| l.id() == id) }
    pub fn contains(&self, product_id: Uuid) -> bool { self.lines.iter().any(|l| l.entry.product_id == product_id) }
    pub fn push(&mut self, line: WishlistLine) { self.lines.push(line); }

    pub fn remove(&mut self, id: Uuid) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.id() != id);
        if self.lines.len() == before { return Err(CartError::ItemNotFound); }
        Ok(())
    }

    pub fn clear(&mut self) { self.lines.clear(); }
}

#[derive(Debug, Clone, PartialEq)] pub enum CartError { ItemNotFound }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Item not found") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(entry: CartEntry, price: Money) -> CartLine {
        let quote = PriceQuote { list_price: price, unit_price: price, sale_discount: None };
        CartLine::priced(entry, "Widget".into(), None, None, quote)
    }

    #[test]
    fn test_cart_merge_by_identity() {
        let mut cart = Cart::new();
        let product = Uuid::now_v7();
        let size = Some(Uuid::now_v7());
        let first = cart.plan_add(product, size, 2);
        cart.upsert(line(first.clone(), Money::new(dec!(44))));
        let merged = cart.plan_add(product, size, 3);
        assert_eq!(merged.id, first.id);
        assert_eq!(merged.quantity, 5);
        cart.upsert(line(merged, Money::new(dec!(44))));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.total_item_count(), 5);
        assert_eq!(cart.subtotal(), Money::new(dec!(220)));

        let other_variation = cart.plan_add(product, None, 1);
        assert_ne!(other_variation.id, first.id);
    }

    #[test]
    fn test_item_count_saturates() {
        let mut cart = Cart::new();
        cart.upsert(line(CartEntry::new(Uuid::now_v7(), None, u32::MAX), Money::new(dec!(1))));
        cart.upsert(line(CartEntry::new(Uuid::now_v7(), None, 1), Money::new(dec!(1))));
        assert_eq!(cart.total_item_count(), u32::MAX);
    }

    #[test]
    fn test_cart_quantity_updates() {
        let mut cart = Cart::new();
        let entry = cart.plan_add(Uuid::now_v7(), None, 2);
        let id = entry.id;
        cart.upsert(line(entry, Money::new(dec!(44))));
        let before = cart.subtotal();
        cart.set_quantity(id, 2).unwrap();
        assert_eq!(cart.subtotal(), before);
        cart.set_quantity(id, 0).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.set_quantity(id, 1), Err(CartError::ItemNotFound));
    }

    #[test]
    fn test_wishlist_contains() {
        let product = Uuid::now_v7();
        let mut list = Wishlist::default();
        let quote = PriceQuote { list_price: Money::ZERO, unit_price: Money::ZERO, sale_discount: None };
        list.push(WishlistLine { entry: WishlistEntry::new(product), product_name: "Lamp".into(), image: None, price: quote });
        assert!(list.contains(product));
        let id = list.lines()[0].id();
        list.remove(id).unwrap();
        assert!(list.is_empty());
    }
}
