//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub base_price: Money,
    pub images: Vec<String>,
    pub category: Option<String>,
    pub average_rating: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(name: impl Into<String>, base_price: Money) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into(), description: String::new(), base_price,
            images: vec![], category: None, average_rating: None, created_at: now, updated_at: now,
        }
    }

    /// First image, used as the thumbnail on cart and wishlist lines.
    pub fn thumbnail(&self) -> Option<&str> { self.images.first().map(String::as_str) }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationType { Size, Color, Bundle }

impl VariationType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Size => "size", Self::Color => "color", Self::Bundle => "bundle" }
    }
}

impl FromStr for VariationType {
    type Err = ProductError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "size" => Ok(Self::Size),
            "color" => Ok(Self::Color),
            "bundle" => Ok(Self::Bundle),
            other => Err(ProductError::UnknownVariationType(other.to_string())),
        }
    }
}

impl fmt::Display for VariationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A sub-option of a product carrying its own additive price adjustment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductVariation {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variation_type: VariationType,
    pub name: String,
    pub price_adjustment: Money,
    pub stock: i32,
}

impl ProductVariation {
    pub fn create(product_id: Uuid, variation_type: VariationType, name: impl Into<String>, price_adjustment: Money, stock: i32) -> Self {
        Self { id: Uuid::now_v7(), product_id, variation_type, name: name.into(), price_adjustment, stock }
    }
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }
}

#[derive(Debug, Clone, PartialEq)] pub enum ProductError { UnknownVariationType(String) }
impl std::error::Error for ProductError {}
impl fmt::Display for ProductError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::UnknownVariationType(t) => write!(f, "unknown variation type `{t}`") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_product_create() {
        let mut p = Product::create("Canvas Tote", Money::new(dec!(50)));
        assert_eq!(p.name, "Canvas Tote");
        assert!(p.thumbnail().is_none());
        p.images.push("tote-front.jpg".into());
        p.images.push("tote-back.jpg".into());
        assert_eq!(p.thumbnail(), Some("tote-front.jpg"));
    }

    #[test]
    fn test_variation_type_parse() {
        assert_eq!("bundle".parse::<VariationType>().unwrap(), VariationType::Bundle);
        assert!("weight".parse::<VariationType>().is_err());
        assert_eq!(serde_json::to_string(&VariationType::Color).unwrap(), "\"color\"");
    }
}
