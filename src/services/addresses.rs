//! Saved shipping addresses. Each user has at most one default.

use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::Context;
use crate::domain::aggregates::{AddressSnapshot, ShippingAddress};
use crate::{Result, StorefrontError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1, max = 120))]
    pub recipient: String,
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 56))]
    pub country: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl AddressInput {
    fn snapshot(self) -> AddressSnapshot {
        AddressSnapshot {
            recipient: self.recipient.trim().to_string(),
            street: self.street.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            postal_code: self.postal_code.trim().to_string(),
            country: self.country.trim().to_string(),
            phone: self.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Clone)]
pub struct AddressService {
    ctx: Context,
}

impl AddressService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    /// Default address first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ShippingAddress>> {
        let mut addresses = self.ctx.store.addresses_for(user_id).await?;
        addresses.sort_by_key(|a| !a.is_default);
        Ok(addresses)
    }

    /// A user's first address becomes their default.
    #[instrument(skip(self, input))]
    pub async fn create(&self, user_id: Uuid, input: AddressInput) -> Result<ShippingAddress> {
        input.validate()?;
        let first = self.ctx.store.addresses_for(user_id).await?.is_empty();
        let wants_default = input.is_default;
        let mut address = ShippingAddress::create(user_id, input.snapshot(), first);
        self.ctx.store.insert_address(&address).await?;
        if wants_default && !first {
            self.ctx.store.set_default_address(user_id, address.id).await?;
            address.is_default = true;
        }
        Ok(address)
    }

    pub async fn update(&self, user_id: Uuid, id: Uuid, input: AddressInput) -> Result<ShippingAddress> {
        input.validate()?;
        let mut address = self.get(user_id, id).await?;
        let wants_default = input.is_default;
        address.address = input.snapshot();
        self.ctx.store.update_address(&address).await?;
        if wants_default && !address.is_default {
            self.ctx.store.set_default_address(user_id, id).await?;
            address.is_default = true;
        }
        Ok(address)
    }

    /// Deleting the default promotes the next remaining address.
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let removed = self.get(user_id, id).await?;
        self.ctx.store.delete_address(user_id, id).await?;
        if removed.is_default {
            if let Some(next) = self.ctx.store.addresses_for(user_id).await?.first() {
                self.ctx.store.set_default_address(user_id, next.id).await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_default(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        if !self.ctx.store.set_default_address(user_id, id).await? {
            return Err(StorefrontError::not_found("address", id));
        }
        Ok(())
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<ShippingAddress> {
        self.ctx.store.get_address(user_id, id).await?.ok_or_else(|| StorefrontError::not_found("address", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::harness;

    fn input(street: &str) -> AddressInput {
        AddressInput {
            recipient: "Grace Hopper".into(),
            street: street.into(),
            city: "Arlington".into(),
            state: Some("VA".into()),
            postal_code: "22201".into(),
            country: "US".into(),
            phone: None,
            is_default: false,
        }
    }

    #[tokio::test]
    async fn test_first_address_is_default_and_default_moves() {
        let h = harness();
        let addresses = AddressService::new(h.ctx.clone());
        let user = Uuid::now_v7();
        let home = addresses.create(user, input("1 Navy Way")).await.unwrap();
        let work = addresses.create(user, input("2 Pentagon Rd")).await.unwrap();
        assert!(home.is_default);
        assert!(!work.is_default);

        addresses.set_default(user, work.id).await.unwrap();
        let listed = addresses.list(user).await.unwrap();
        assert_eq!(listed[0].id, work.id);
        assert_eq!(listed.iter().filter(|a| a.is_default).count(), 1);

        addresses.delete(user, work.id).await.unwrap();
        let listed = addresses.list(user).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_default);
    }

    #[tokio::test]
    async fn test_foreign_or_invalid_addresses() {
        let h = harness();
        let addresses = AddressService::new(h.ctx.clone());
        let owner = Uuid::now_v7();
        let home = addresses.create(owner, input("1 Navy Way")).await.unwrap();
        assert!(addresses.set_default(Uuid::now_v7(), home.id).await.is_err());
        assert!(matches!(addresses.create(owner, input("")).await, Err(StorefrontError::Validation(_))));
    }
}
