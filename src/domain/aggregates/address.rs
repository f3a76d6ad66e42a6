//! Shipping addresses

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub is_default: bool,
    #[serde(flatten)]
    pub address: AddressSnapshot,
}

impl ShippingAddress {
    pub fn create(user_id: Uuid, address: AddressSnapshot, is_default: bool) -> Self {
        Self { id: Uuid::now_v7(), user_id, is_default, address }
    }
}

/// Address fields as frozen onto an order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub recipient: String,
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}
